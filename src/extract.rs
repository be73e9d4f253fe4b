//! Parsers for the two page shapes we scrape: the image search results page
//! and an image detail page.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Serialize, Serializer};
use url::Url;

use crate::fetcher::HtmlDocument;

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

pub const MAX_ALT_CHARS: usize = 200;

/// One `<img>` found on a detail page. Absent attributes are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageDescriptor {
    pub page_url: String,
    /// Empty when the markup held an inline `data:` placeholder.
    pub src: String,
    pub data_src: String,
    pub alt: String,
    pub width: String,
    pub height: String,
    #[serde(serialize_with = "pipe_joined")]
    pub classes: Vec<String>,
    pub id: String,
}

impl ImageDescriptor {
    pub fn has_src(&self) -> bool {
        !self.src.is_empty()
    }
}

fn pipe_joined<S: Serializer>(classes: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&classes.join("|"))
}

/// Detail-page links from a results page, in document order, at most `max_results`.
///
/// An anchor matches when its class set contains every class of `fingerprint`
/// and its `href` resolves against the page origin. Protocol-relative and
/// root-relative hrefs become absolute.
pub fn extract_links(doc: &HtmlDocument, fingerprint: &[String], max_results: usize) -> Vec<String> {
    if max_results == 0 {
        return Vec::new();
    }

    let origin = page_origin(&doc.url);
    let document = Html::parse_document(&doc.body);

    document
        .select(&ANCHOR_SELECTOR)
        .filter(|el| {
            let classes: Vec<&str> = el.value().classes().collect();
            fingerprint.iter().all(|fp| classes.contains(&fp.as_str()))
        })
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .filter_map(|href| origin.join(href).ok())
        .map(|url| url.to_string())
        .take(max_results)
        .collect()
}

/// Whether the page carries any `<img>` at all; used to tell an empty results
/// page from one whose markup no longer matches the fingerprint.
pub fn has_images(doc: &HtmlDocument) -> bool {
    Html::parse_document(&doc.body).select(&IMG_SELECTOR).next().is_some()
}

/// Every `<img>` on a detail page, in document order.
pub fn extract_images(doc: &HtmlDocument, source_url: &str) -> Vec<ImageDescriptor> {
    let document = Html::parse_document(&doc.body);

    document
        .select(&IMG_SELECTOR)
        .map(|el| {
            let attr = |name: &str| el.value().attr(name).unwrap_or_default().to_string();
            let src = el.value().attr("src").unwrap_or_default();

            ImageDescriptor {
                page_url: source_url.to_string(),
                src: if is_inline_data(src) { String::new() } else { src.to_string() },
                data_src: attr("data-src"),
                alt: truncate_chars(el.value().attr("alt").unwrap_or_default(), MAX_ALT_CHARS),
                width: attr("width"),
                height: attr("height"),
                classes: el.value().classes().map(|c| c.to_string()).collect(),
                id: attr("id"),
            }
        })
        .collect()
}

fn is_inline_data(src: &str) -> bool {
    src.trim_start()
        .get(..5)
        .map(|scheme| scheme.eq_ignore_ascii_case("data:"))
        .unwrap_or(false)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn page_origin(url: &Url) -> Url {
    let mut origin = url.clone();
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    origin
}

//! Per-entity image discovery.
//!
//! Each entity walks `QueryBuilt -> LinksFetched -> ImagesExtracted ->
//! CanonicalResolved -> Recorded`, or stops in `Skipped` at whichever stage
//! failed. Entities are processed one at a time and a failed entity never
//! stops the batch.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::canonical::resolve_canonical;
use crate::config::ScrapeConfig;
use crate::error::{FetchError, SkipReason};
use crate::extract::{extract_images, extract_links, has_images, ImageDescriptor};
use crate::fetcher::{Fetcher, HtmlDocument};
use crate::store::AppendStore;

pub const RECORD_HEADER: [&str; 3] = ["entity", "canonical_image_url", "detail_page_url"];
pub const DESCRIPTOR_HEADER: [&str; 8] =
    ["page_url", "src", "data_src", "alt", "width", "height", "classes", "id"];

/// One row of the output store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelatedRecord {
    pub entity: String,
    pub canonical_image_url: String,
    pub detail_page_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    QueryBuilt,
    LinksFetched,
    ImagesExtracted,
    CanonicalResolved,
    Recorded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::QueryBuilt => "query_built",
            Stage::LinksFetched => "links_fetched",
            Stage::ImagesExtracted => "images_extracted",
            Stage::CanonicalResolved => "canonical_resolved",
            Stage::Recorded => "recorded",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum EntityOutcome {
    Recorded(CorrelatedRecord),
    /// `stage` is the last state reached before the failure.
    Skipped { stage: Stage, reason: SkipReason },
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub recorded: usize,
    pub skipped: Vec<(String, SkipReason)>,
}

/// Enforces a fixed pause between the end of one request to the search site
/// and the start of the next.
pub struct Pacer {
    delay: Duration,
    finished: Option<Instant>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, finished: None }
    }

    /// Sleep until `delay` has passed since the previous request finished.
    pub async fn wait(&mut self) {
        if let Some(finished) = self.finished {
            let elapsed = finished.elapsed();
            if elapsed < self.delay {
                sleep(self.delay - elapsed).await;
            }
        }
    }

    /// Mark the current request as finished, successful or not.
    pub fn done(&mut self) {
        self.finished = Some(Instant::now());
    }
}

pub struct Pipeline {
    config: ScrapeConfig,
    fetcher: Fetcher,
    pacer: Pacer,
}

impl Pipeline {
    pub fn new(config: ScrapeConfig) -> anyhow::Result<Self> {
        let fetcher = Fetcher::new(&config)?;
        let pacer = Pacer::new(config.politeness_delay);
        Ok(Self { config, fetcher, pacer })
    }

    /// Process every entity in order, appending one record per success.
    pub async fn run(
        &mut self,
        entities: &[String],
        store: &mut AppendStore,
        mut dump: Option<&mut AppendStore>,
    ) -> RunSummary {
        let mut summary = RunSummary::default();

        for (i, entity) in entities.iter().enumerate() {
            info!(entity = %entity, "🔎 [{}/{}] searching images", i + 1, entities.len());

            let outcome = self.process_entity(entity, dump.as_deref_mut()).await;
            let outcome = match outcome {
                EntityOutcome::Recorded(record) => match store.append(&record) {
                    Ok(()) => EntityOutcome::Recorded(record),
                    Err(e) => EntityOutcome::Skipped {
                        stage: Stage::CanonicalResolved,
                        reason: SkipReason::StoreFailed(e),
                    },
                },
                skipped => skipped,
            };

            match outcome {
                EntityOutcome::Recorded(record) => {
                    info!(
                        entity = %entity,
                        stage = %Stage::Recorded,
                        image = %record.canonical_image_url,
                        "✅ recorded"
                    );
                    summary.recorded += 1;
                }
                EntityOutcome::Skipped { stage, reason } => {
                    log_skip(entity, stage, &reason);
                    summary.skipped.push((entity.clone(), reason));
                }
            }
        }

        summary
    }

    /// Run one entity through the pipeline without touching the output store.
    pub async fn process_entity(
        &mut self,
        entity: &str,
        mut dump: Option<&mut AppendStore>,
    ) -> EntityOutcome {
        let skip = |stage: Stage, reason: SkipReason| EntityOutcome::Skipped { stage, reason };
        if self.config.max_results == 0 {
            return skip(Stage::QueryBuilt, SkipReason::NoResults);
        }
        let search_url = self.config.search_url(entity);

        let results = match self.fetch_with_retry(&search_url, entity).await {
            Ok(doc) => doc,
            Err(e) => return skip(Stage::QueryBuilt, e.into()),
        };

        let links = extract_links(&results, &self.config.fingerprint, self.config.max_results);
        debug!(entity, count = links.len(), "extracted result links");
        if links.is_empty() {
            let reason = if has_images(&results) {
                SkipReason::ParseMismatch(format!(
                    "results page has images but no anchor with classes {:?}",
                    self.config.fingerprint
                ))
            } else {
                SkipReason::NoResults
            };
            return skip(Stage::LinksFetched, reason);
        }

        let Some(selected) = self.first_qualifying_image(entity, &links, &mut dump).await else {
            return skip(Stage::LinksFetched, SkipReason::NoImageFound);
        };

        let canonical = match resolve_canonical(&selected.page_url) {
            Ok(url) => url,
            Err(e) => return skip(Stage::ImagesExtracted, e.into()),
        };

        EntityOutcome::Recorded(CorrelatedRecord {
            entity: entity.to_string(),
            canonical_image_url: canonical,
            detail_page_url: selected.page_url,
        })
    }

    /// Walk the result links in order and return the first image with a usable `src`.
    async fn first_qualifying_image(
        &mut self,
        entity: &str,
        links: &[String],
        dump: &mut Option<&mut AppendStore>,
    ) -> Option<ImageDescriptor> {
        for link in links {
            let doc = match self.fetch_with_retry(link, entity).await {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(entity, stage = %Stage::LinksFetched, url = %link, kind = e.kind(), "detail page failed: {}", e);
                    continue;
                }
            };

            let images = extract_images(&doc, link);
            if images.is_empty() {
                error!(
                    entity,
                    stage = %Stage::LinksFetched,
                    url = %link,
                    kind = "parse_mismatch",
                    "detail page has no <img> elements"
                );
                continue;
            }

            if let Some(store) = dump.as_deref_mut() {
                for image in &images {
                    if let Err(e) = store.append(image) {
                        warn!(entity, url = %link, "descriptor dump failed: {}", e);
                        break;
                    }
                }
            }

            if let Some(image) = images.into_iter().find(ImageDescriptor::has_src) {
                return Some(image);
            }
            debug!(entity, url = %link, "no image with a src on detail page");
        }
        None
    }

    /// Paced fetch with bounded retries on network errors only.
    async fn fetch_with_retry(&mut self, url: &str, entity: &str) -> Result<HtmlDocument, FetchError> {
        let policy = self.config.retry.clone();
        let mut attempt = 1;
        loop {
            self.pacer.wait().await;
            let result = self.fetcher.fetch(url).await;
            self.pacer.done();
            match result {
                Ok(doc) => return Ok(doc),
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    attempt += 1;
                    let wait = policy.delay_before(attempt);
                    warn!(
                        entity,
                        url,
                        kind = e.kind(),
                        attempt,
                        "🔄 retrying in {:?}: {}", wait, e
                    );
                    sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn log_skip(entity: &str, stage: Stage, reason: &SkipReason) {
    match reason {
        SkipReason::ParseMismatch(_) => error!(
            entity,
            stage = %stage,
            kind = reason.kind(),
            "skipped, page layout changed: {}", reason
        ),
        SkipReason::FetchFailed(e) if e.is_retryable() => warn!(
            entity,
            stage = %stage,
            kind = reason.kind(),
            "skipped, retry later: {}", reason
        ),
        _ => warn!(entity, stage = %stage, kind = reason.kind(), "skipped: {}", reason),
    }
}

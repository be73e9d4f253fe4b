//! Market listings synthesized by a generative text model.
//!
//! The image pipeline only ever sees the CSV these rows end up in; the
//! generator has its own error type and never shares failures with scraping.

use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{info, warn};

use crate::config::GeneratorConfig;
use crate::error::GeneratorError;
use crate::store::AppendStore;

pub const MARKET_HEADERS: [&str; 16] = [
    "state_name",
    "state_abbreviation",
    "county_name",
    "market_name",
    "market_description",
    "market_address",
    "market_city",
    "market_zipcode",
    "market_latitude",
    "market_longitude",
    "market_open_days",
    "market_open_time",
    "market_close_time",
    "market_website",
    "market_phone",
    "market_email",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketRow {
    pub state_name: String,
    pub state_abbreviation: String,
    pub county_name: String,
    pub market_name: String,
    pub market_description: String,
    pub market_address: String,
    pub market_city: String,
    pub market_zipcode: String,
    pub market_latitude: String,
    pub market_longitude: String,
    pub market_open_days: String,
    pub market_open_time: String,
    pub market_close_time: String,
    pub market_website: String,
    pub market_phone: String,
    pub market_email: String,
}

impl MarketRow {
    /// Build a row from loose fields: missing trailing columns become empty, extras are dropped.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut it = fields.into_iter().map(Into::<String>::into);
        let mut next = || it.next().unwrap_or_default();
        Self {
            state_name: next(),
            state_abbreviation: next(),
            county_name: next(),
            market_name: next(),
            market_description: next(),
            market_address: next(),
            market_city: next(),
            market_zipcode: next(),
            market_latitude: next(),
            market_longitude: next(),
            market_open_days: next(),
            market_open_time: next(),
            market_close_time: next(),
            market_website: next(),
            market_phone: next(),
            market_email: next(),
        }
    }
}

/// Producer of market rows for a free-text query.
pub trait RecordGenerator {
    fn generate(&self, query: &str) -> impl Future<Output = Result<Vec<MarketRow>, GeneratorError>> + Send;
}

/// Parse model output into rows.
///
/// Tolerates markdown fences, a repeated header row and blank lines.
pub fn parse_generated_csv(text: &str) -> Result<Vec<MarketRow>, GeneratorError> {
    let body: String = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.get(0) == Some(MARKET_HEADERS[0]) {
            continue;
        }
        rows.push(MarketRow::from_fields(record.iter()));
    }
    Ok(rows)
}

pub fn market_prompt(county: &str, state: &str) -> String {
    format!(
        r#"Return ALL farmers markets in {county} County, {state} as RAW CSV DATA with NO ADDITIONAL TEXT.
Use empty strings for missing data. Include EXACTLY these 16 columns in this order:
{columns}

Example format:
California,CA,Sonoma,Santa Rosa Original Farmers Market,"Vintage market since 1978","100 Santa Rosa Ave",Santa Rosa,95404,38.4405,-122.7141,Saturday,08:30:00,13:00:00,http://santarosafarmersmarket.org,707-555-1234,

Rules:
1. MUST include header row
2. Each data row MUST have exactly 16 comma-separated values
3. Quote fields containing commas
4. Never use markdown code blocks
5. Use empty strings for missing data
"#,
        columns = MARKET_HEADERS.join(",")
    )
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Gemini `generateContent` over REST.
pub struct GeminiGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, GeneratorError> {
        let api_key = config.api_key.clone().ok_or(GeneratorError::MissingApiKey)?;
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config, api_key })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn complete(&self, prompt: &str) -> Result<String, GeneratorError> {
        let payload = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::HttpStatus { status: status.as_u16(), body });
        }

        let data: GenerateResponse = response.json().await?;
        let text: String = data
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GeneratorError::EmptyResponse);
        }
        Ok(text)
    }
}

impl RecordGenerator for GeminiGenerator {
    async fn generate(&self, query: &str) -> Result<Vec<MarketRow>, GeneratorError> {
        let text = self.complete(query).await?;
        parse_generated_csv(&text)
    }
}

#[derive(Debug, Default)]
pub struct GenerateSummary {
    pub rows: usize,
    pub failed: Vec<(String, GeneratorError)>,
}

/// Generate rows for every county and append them to `store`.
/// A county that fails is logged and left out; the others still run.
pub async fn generate_markets<G: RecordGenerator>(
    generator: &G,
    state: &str,
    counties: &[String],
    store: &mut AppendStore,
) -> GenerateSummary {
    let mut summary = GenerateSummary::default();

    for county in counties {
        let prompt = market_prompt(county, state);
        match generator.generate(&prompt).await {
            Ok(rows) => {
                let mut written = 0;
                for row in &rows {
                    if let Err(e) = store.append(row) {
                        warn!(county = %county, "failed to append market row: {}", e);
                        break;
                    }
                    written += 1;
                }
                info!(county = %county, rows = written, "🧺 markets generated");
                summary.rows += written;
            }
            Err(e) => {
                warn!(county = %county, "generator failed: {}", e);
                summary.failed.push((county.clone(), e));
            }
        }
    }

    summary
}

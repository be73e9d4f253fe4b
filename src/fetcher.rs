use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ScrapeConfig;
use crate::error::FetchError;

// Image search rejects the default reqwest identity.
static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:124.0) Gecko/20100101 Firefox/124.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    ]
});

const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// Raw markup of a fetched page.
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    /// Final URL after redirects.
    pub url: Url,
    pub body: String,
}

/// Issues single GET requests with a browser identity. Never retries.
pub struct Fetcher {
    client: reqwest::Client,
    user_agent: Option<String>,
    referer: String,
}

impl Fetcher {
    pub fn new(config: &ScrapeConfig) -> anyhow::Result<Self> {
        Self::with_timeout(config, config.timeout)
    }

    pub fn with_timeout(config: &ScrapeConfig, timeout: Duration) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(timeout);

        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            user_agent: config.user_agent.clone(),
            referer: format!("{}/", config.search_base_url.trim_end_matches('/')),
        })
    }

    fn pick_user_agent(&self) -> &str {
        match &self.user_agent {
            Some(ua) => ua,
            None => USER_AGENTS
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(FALLBACK_USER_AGENT),
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<HtmlDocument, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let network = |source| FetchError::Network { url: url.to_string(), source };

        let resp = self
            .client
            .get(parsed)
            .header(USER_AGENT, self.pick_user_agent())
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(REFERER, &self.referer)
            .send()
            .await
            .map_err(network)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = resp.url().clone();
        let body = resp.text().await.map_err(network)?;
        debug!(url = %final_url, bytes = body.len(), "fetched page");

        Ok(HtmlDocument { url: final_url, body })
    }
}

//! Runtime configuration.
//!
//! Values come from the environment (a `.env` file is loaded first by `main`)
//! and can be overridden per run from the command line.

use std::time::Duration;

pub const DEFAULT_SEARCH_BASE_URL: &str = "https://images.search.yahoo.com";
pub const DEFAULT_FINGERPRINT: [&str; 2] = ["redesign-img", "round-img"];
/// Query parameter the detail page uses to carry the full-size image link.
pub const CANONICAL_PARAM: &str = "imgurl";

/// Bounded retry for transient network failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Linear step: the wait before attempt `n` is `backoff * (n - 1)`.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff * attempt.saturating_sub(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub search_base_url: String,
    /// Classes an anchor must carry to count as an image result.
    pub fingerprint: Vec<String>,
    pub max_results: usize,
    pub timeout: Duration,
    /// Minimum gap between two requests to the search site.
    pub politeness_delay: Duration,
    pub retry: RetryPolicy,
    /// Fixed user agent; when unset one is picked at random per request.
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            search_base_url: DEFAULT_SEARCH_BASE_URL.to_string(),
            fingerprint: DEFAULT_FINGERPRINT.iter().map(|c| c.to_string()).collect(),
            max_results: 2,
            timeout: Duration::from_secs(10),
            politeness_delay: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            user_agent: None,
            proxy: None,
        }
    }
}

impl ScrapeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let fingerprint = std::env::var("SEARCH_FINGERPRINT")
            .ok()
            .map(|s| parse_class_list(&s))
            .filter(|classes| !classes.is_empty())
            .unwrap_or(defaults.fingerprint);

        Self {
            search_base_url: env_string("SEARCH_BASE_URL").unwrap_or(defaults.search_base_url),
            fingerprint,
            max_results: env_parse("SEARCH_MAX_RESULTS").unwrap_or(defaults.max_results),
            timeout: env_parse("SCRAPER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            politeness_delay: env_parse("SCRAPER_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.politeness_delay),
            retry: RetryPolicy {
                max_attempts: env_parse::<u32>("SCRAPER_MAX_ATTEMPTS")
                    .unwrap_or(defaults.retry.max_attempts)
                    .max(1),
                backoff: env_parse("SCRAPER_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.backoff),
            },
            user_agent: env_string("SCRAPER_USER_AGENT"),
            proxy: env_string("SCRAPER_PROXY"),
        }
    }

    /// Results-page URL for one entity.
    pub fn search_url(&self, query: &str) -> String {
        format!(
            "{}/search/images?p={}&imgty=photo",
            self.search_base_url.trim_end_matches('/'),
            urlencoding::encode(query.trim())
        )
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl GeneratorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env_string("GEMINI_API_KEY"),
            model: env_string("GEMINI_MODEL").unwrap_or(defaults.model),
            base_url: env_string("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            timeout: defaults.timeout,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Split a comma or whitespace separated class list.
pub fn parse_class_list(s: &str) -> Vec<String> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| c.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_encodes_query() {
        let config = ScrapeConfig {
            search_base_url: "https://images.search.yahoo.com/".into(),
            ..Default::default()
        };
        assert_eq!(
            config.search_url("Ferry Plaza & Co"),
            "https://images.search.yahoo.com/search/images?p=Ferry%20Plaza%20%26%20Co&imgty=photo"
        );
    }

    #[test]
    fn test_retry_delay_is_linear() {
        let policy = RetryPolicy { max_attempts: 3, backoff: Duration::from_millis(100) };
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
    }

    #[test]
    fn test_parse_class_list() {
        assert_eq!(parse_class_list("redesign-img, round-img"), vec!["redesign-img", "round-img"]);
        assert_eq!(parse_class_list(" a  b,,c "), vec!["a", "b", "c"]);
        assert!(parse_class_list(" , ").is_empty());
    }

    #[test]
    fn test_defaults() {
        let config = ScrapeConfig::default();
        assert_eq!(config.max_results, 2);
        assert_eq!(config.fingerprint, vec!["redesign-img", "round-img"]);
        assert_eq!(config.retry.max_attempts, 3);
    }
}

use thiserror::Error;

/// Failure of a single outbound page fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// DNS, connect, timeout or body read failure.
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },
}

impl FetchError {
    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl { .. } => "invalid_url",
            FetchError::Network { .. } => "network",
            FetchError::HttpStatus { .. } => "http_status",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("invalid detail url {0}")]
    InvalidUrl(String),

    #[error("no `{param}` parameter in {url}")]
    NotFound { url: String, param: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("column `{column}` not found in {path}")]
    MissingColumn { column: String, path: String },
}

/// Failure of the record generator; kept apart from the scraping errors.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,

    #[error("generator request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("generator returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("generator returned no text")]
    EmptyResponse,

    #[error("generator output is not valid csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Why an entity produced no record.
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("fetch failed: {0}")]
    FetchFailed(#[from] FetchError),

    #[error("no result links")]
    NoResults,

    /// The page was fetched but the expected structure was absent.
    #[error("parse mismatch: {0}")]
    ParseMismatch(String),

    #[error("no image found")]
    NoImageFound,

    #[error("resolve failed: {0}")]
    ResolveFailed(#[from] ResolveError),

    #[error("store failed: {0}")]
    StoreFailed(#[from] StoreError),
}

impl SkipReason {
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::FetchFailed(e) => e.kind(),
            SkipReason::NoResults => "no_results",
            SkipReason::ParseMismatch(_) => "parse_mismatch",
            SkipReason::NoImageFound => "no_image_found",
            SkipReason::ResolveFailed(_) => "resolve_failed",
            SkipReason::StoreFailed(_) => "store_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_errors_retry() {
        let status = FetchError::HttpStatus { url: "http://x".into(), status: 500 };
        assert!(!status.is_retryable());
        let invalid = FetchError::InvalidUrl { url: "nope".into(), reason: "relative".into() };
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn test_skip_reason_kinds() {
        assert_eq!(SkipReason::NoImageFound.kind(), "no_image_found");
        assert_eq!(SkipReason::ParseMismatch("gone".into()).kind(), "parse_mismatch");
        let resolve = ResolveError::NotFound { url: "u".into(), param: "imgurl".into() };
        assert_eq!(SkipReason::from(resolve).kind(), "resolve_failed");
        let status = FetchError::HttpStatus { url: "u".into(), status: 503 };
        assert_eq!(SkipReason::from(status).kind(), "http_status");
    }
}

use url::Url;

use crate::config::CANONICAL_PARAM;
use crate::error::ResolveError;

/// Recover the full-size image URL a detail page link carries in its query.
pub fn resolve_canonical(detail_url: &str) -> Result<String, ResolveError> {
    resolve_param(detail_url, CANONICAL_PARAM)
}

pub fn resolve_param(detail_url: &str, param: &str) -> Result<String, ResolveError> {
    let url = Url::parse(detail_url).map_err(|_| ResolveError::InvalidUrl(detail_url.to_string()))?;

    // Work on the raw query so the value is decoded exactly once, here.
    url.query()
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == param)
        .map(|(_, value)| percent_decode(value))
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ResolveError::NotFound {
            url: detail_url.to_string(),
            param: param.to_string(),
        })
}

/// Percent-decode, leaving the input untouched when it does not decode to UTF-8.
/// Input without escapes comes back unchanged.
pub fn percent_decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_encoded_imgurl() {
        let detail = "https://images.search.yahoo.com/images/view;_ylt=abc?back=x&w=1024&imgurl=https%3A%2F%2Fcdn.example.com%2Fmarkets%2Fferry%20plaza.jpg&rurl=https%3A%2F%2Fexample.com";
        assert_eq!(
            resolve_canonical(detail).unwrap(),
            "https://cdn.example.com/markets/ferry plaza.jpg"
        );
    }

    #[test]
    fn test_already_decoded_value_is_unchanged() {
        let detail = "https://images.search.yahoo.com/images/view?imgurl=https://cdn.example.com/a.jpg";
        assert_eq!(resolve_canonical(detail).unwrap(), "https://cdn.example.com/a.jpg");

        let once = percent_decode("https%3A%2F%2Fcdn.example.com%2Fa.jpg");
        assert_eq!(percent_decode(&once), once);
    }

    #[test]
    fn test_missing_param_is_not_found() {
        let detail = "https://images.search.yahoo.com/images/view?rurl=https%3A%2F%2Fexample.com";
        assert!(matches!(resolve_canonical(detail), Err(ResolveError::NotFound { .. })));

        let empty = "https://images.search.yahoo.com/images/view?imgurl=&w=1";
        assert!(matches!(resolve_canonical(empty), Err(ResolveError::NotFound { .. })));

        let no_query = "https://images.search.yahoo.com/images/view";
        assert!(matches!(resolve_canonical(no_query), Err(ResolveError::NotFound { .. })));
    }

    #[test]
    fn test_param_name_must_match_exactly() {
        let detail = "https://example.com/view?thumbimgurl=https%3A%2F%2Fa.jpg";
        assert!(resolve_canonical(detail).is_err());
    }

    #[test]
    fn test_invalid_url() {
        assert_eq!(
            resolve_canonical("not a url"),
            Err(ResolveError::InvalidUrl("not a url".to_string()))
        );
    }

    #[test]
    fn test_malformed_escape_is_tolerated() {
        assert_eq!(percent_decode("100%25"), "100%");
        assert_eq!(percent_decode("bad%ff%fe"), "bad%ff%fe");
    }
}

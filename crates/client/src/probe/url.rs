//! URL checks for authorization probes.
//!
//! Probes must hit the exact URL the caching engine saw, so nothing here
//! rewrites the input. `parse_candidate` only gates what may be probed.

pub use layercache_core::patterns::strip_query;

/// Error type for candidate URL failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Check that a candidate URL is an absolute http(s) URL.
///
/// The returned `Url` is for inspection only; callers keep probing and
/// logging from the original string.
pub fn parse_candidate(input: &str) -> Result<url::Url, UrlError> {
    if input.is_empty() {
        return Err(UrlError::Empty);
    }

    let parsed = url::Url::parse(input).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if parsed.host_str().is_none() {
        return Err(UrlError::InvalidUrl("missing host".into()));
    }

    Ok(parsed)
}

//! Pre-cache header adaptation.
//!
//! For URLs in the pattern set the caching engine is shown a copy of the
//! request without `Authorization`, so credentials alone do not make a
//! public blob uncacheable. The request handed in is never modified; the
//! adjusted headers are always a fresh copy.

use std::sync::Arc;

use http::header::AUTHORIZATION;
use http::{HeaderMap, Method, Version};

use layercache_core::{PatternSet, strip_query};

/// Metadata of one pending HTTP request, as seen by the adapter.
#[derive(Debug, Clone)]
pub struct AdaptRequest {
    pub method: Method,
    /// Request target exactly as received (absolute or origin form).
    pub target: String,
    pub version: Version,
    /// Absolute URL used for pattern matching.
    pub url: String,
    pub headers: HeaderMap,
}

/// Outcome of adapting one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Adaptation {
    /// Leave the request as it is.
    Unchanged,
    /// Use these headers for the cache admission decision only.
    HeaderAdjusted(HeaderMap),
}

/// Strips `Authorization` from the cache-decision copy of matching requests.
#[derive(Debug, Clone)]
pub struct HeaderAdapter {
    patterns: Arc<PatternSet>,
}

impl HeaderAdapter {
    pub fn new(patterns: Arc<PatternSet>) -> Self {
        Self { patterns }
    }

    /// Whether `url` is subject to adaptation at all.
    pub fn is_eligible(&self, url: &str) -> bool {
        self.patterns.is_match(url)
    }

    pub fn adapt(&self, request: &AdaptRequest) -> Adaptation {
        let url = strip_query(&request.url);

        if !self.is_eligible(&request.url) {
            tracing::debug!(method = %request.method, url, "no pattern matched, unchanged");
            return Adaptation::Unchanged;
        }

        if !request.headers.contains_key(AUTHORIZATION) {
            tracing::debug!(method = %request.method, url, "matched without credentials, unchanged");
            return Adaptation::Unchanged;
        }

        let mut headers = request.headers.clone();
        headers.remove(AUTHORIZATION);
        tracing::debug!(method = %request.method, url, "stripping Authorization for cache decision");

        Adaptation::HeaderAdjusted(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn adapter() -> HeaderAdapter {
        HeaderAdapter::new(Arc::new(PatternSet::new([r"^https://cdn[0-9]+\.example\.net/blob/"]).unwrap()))
    }

    fn request(url: &str, headers: &[(&'static str, &'static str)]) -> AdaptRequest {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(*name, HeaderValue::from_static(value));
        }
        AdaptRequest {
            method: Method::GET,
            target: url.to_string(),
            version: Version::HTTP_11,
            url: url.to_string(),
            headers: map,
        }
    }

    #[test]
    fn test_matching_request_drops_only_authorization() {
        let req = request(
            "https://cdn01.example.net/blob/abc?sig=1",
            &[("authorization", "Bearer X"), ("x-foo", "bar"), ("accept", "*/*")],
        );

        let Adaptation::HeaderAdjusted(adjusted) = adapter().adapt(&req) else {
            panic!("expected adjusted headers");
        };

        assert!(adjusted.get(AUTHORIZATION).is_none());
        assert_eq!(adjusted.get("x-foo").unwrap(), "bar");
        assert_eq!(adjusted.get("accept").unwrap(), "*/*");
        assert_eq!(adjusted.len(), 2);
    }

    #[test]
    fn test_original_request_untouched() {
        let req = request("https://cdn01.example.net/blob/abc", &[("authorization", "Bearer X"), ("x-foo", "bar")]);
        let before = req.headers.clone();

        let _ = adapter().adapt(&req);

        assert_eq!(req.headers, before);
        assert_eq!(req.headers.get(AUTHORIZATION).unwrap(), "Bearer X");
        assert_eq!(req.headers.get("x-foo").unwrap(), "bar");
    }

    #[test]
    fn test_repeated_authorization_values_all_removed() {
        let req = request(
            "https://cdn01.example.net/blob/abc",
            &[("authorization", "Bearer X"), ("authorization", "Basic Y"), ("x-foo", "bar")],
        );

        let Adaptation::HeaderAdjusted(adjusted) = adapter().adapt(&req) else {
            panic!("expected adjusted headers");
        };
        assert!(adjusted.get_all(AUTHORIZATION).iter().next().is_none());
    }

    #[test]
    fn test_duplicate_other_headers_preserved() {
        let req = request(
            "https://cdn01.example.net/blob/abc",
            &[("authorization", "Bearer X"), ("x-trace", "a"), ("x-trace", "b")],
        );

        let Adaptation::HeaderAdjusted(adjusted) = adapter().adapt(&req) else {
            panic!("expected adjusted headers");
        };
        let traces: Vec<_> = adjusted.get_all("x-trace").iter().collect();
        assert_eq!(traces, vec!["a", "b"]);
    }

    #[test]
    fn test_non_matching_request_unchanged() {
        let req = request("https://registry.example.net/v2/x/manifests/latest", &[("authorization", "Bearer X")]);
        assert_eq!(adapter().adapt(&req), Adaptation::Unchanged);
    }

    #[test]
    fn test_matching_request_without_credentials_unchanged() {
        let req = request("https://cdn01.example.net/blob/abc", &[("x-foo", "bar")]);
        assert_eq!(adapter().adapt(&req), Adaptation::Unchanged);
    }
}

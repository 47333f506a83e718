//! Both helpers must agree on which URLs are eligible when built from the
//! same configuration.

use std::sync::Arc;

use http::{HeaderMap, HeaderValue, Method, StatusCode, Version, header::AUTHORIZATION};
use layercache_client::{Normalization, Normalizer, Prober};
use layercache_core::{AppConfig, Error};
use layercache_server::{AdaptRequest, Adaptation, HeaderAdapter};

const DIGEST: &str = "9b2a3c1d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f9";

struct AlwaysOk;

#[async_trait::async_trait]
impl Prober for AlwaysOk {
    async fn probe(&self, _url: &str) -> Result<StatusCode, Error> {
        Ok(StatusCode::OK)
    }
}

fn representative_urls() -> Vec<(String, bool)> {
    vec![
        (
            format!(
                "https://production.cloudflare.docker.com/registry-v2/docker/registry/v2/blobs/sha256/9b/{DIGEST}/data?verify=1700000000-x"
            ),
            true,
        ),
        (format!("https://cdn03.quay.io/sha256/9b/{DIGEST}?Expires=1&Signature=s"), true),
        (
            format!(
                "https://s3.us-west-2.amazonaws.com/registry-bucket/docker/registry/v2/blobs/sha256/9b/{DIGEST}/data?X-Amz-Signature=s"
            ),
            true,
        ),
        (
            format!(
                "https://registry-bucket.s3.us-west-2.amazonaws.com/docker/registry/v2/blobs/sha256/9b/{DIGEST}/data?X-Amz-Signature=s"
            ),
            true,
        ),
        ("https://registry-1.docker.io/v2/library/alpine/manifests/3.20".to_string(), false),
    ]
}

fn request(url: &str) -> AdaptRequest {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer X"));
    headers.insert("x-foo", HeaderValue::from_static("bar"));
    AdaptRequest { method: Method::GET, target: url.to_string(), version: Version::HTTP_11, url: url.to_string(), headers }
}

#[tokio::test]
async fn test_normalizer_and_adapter_agree() {
    let config = AppConfig::default();
    let patterns = Arc::new(config.pattern_set().unwrap());
    let normalizer = Normalizer::new(patterns.clone(), Arc::new(AlwaysOk));
    let adapter = HeaderAdapter::new(patterns);

    for (url, expected) in representative_urls() {
        assert_eq!(normalizer.is_eligible(&url), expected, "{url}");
        assert_eq!(adapter.is_eligible(&url), expected, "{url}");

        let normalized = matches!(normalizer.normalize(&url).await, Normalization::Normalized(_));
        let adjusted = matches!(adapter.adapt(&request(&url)), Adaptation::HeaderAdjusted(_));
        assert_eq!(normalized, adjusted, "{url}");
        assert_eq!(normalized, expected, "{url}");
    }
}

#[tokio::test]
async fn test_store_id_is_query_free_and_adapted_copy_keeps_other_headers() {
    let config = AppConfig::default();
    let patterns = Arc::new(config.pattern_set().unwrap());
    let normalizer = Normalizer::new(patterns.clone(), Arc::new(AlwaysOk));
    let adapter = HeaderAdapter::new(patterns);

    let url = format!("https://cdn03.quay.io/sha256/9b/{DIGEST}?Expires=1&Signature=s");

    assert_eq!(
        normalizer.normalize(&url).await,
        Normalization::Normalized(format!("https://cdn03.quay.io/sha256/9b/{DIGEST}"))
    );

    let original = request(&url);
    let Adaptation::HeaderAdjusted(adjusted) = adapter.adapt(&original) else {
        panic!("expected adjusted headers");
    };
    assert!(adjusted.get(AUTHORIZATION).is_none());
    assert_eq!(adjusted.get("x-foo").unwrap(), "bar");
    assert_eq!(original.headers.get(AUTHORIZATION).unwrap(), "Bearer X");
    assert_eq!(original.headers.get("x-foo").unwrap(), "bar");
}

//! Store-id normalization for content-addressable CDN URLs.
//!
//! A URL gets a query-less store-id only when it matches the pattern set and
//! a live probe of the untouched URL returns `200 OK`. Every other outcome,
//! including probe errors and unparsable input, keeps the engine's default
//! key.

pub mod line;
pub mod serve;

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

use layercache_core::PatternSet;

use crate::probe::{NegativeCache, Prober, parse_candidate, strip_query};

pub use line::{Directive, HelperRequest, LineError, MAX_LINE_BYTES, decode_line, parse_line};
pub use serve::serve_lines;

/// Outcome of normalizing one candidate URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalization {
    /// Not shareable; the engine keys on the original URL.
    PassThrough,
    /// Shareable under this store-id.
    Normalized(String),
}

/// Computes store-ids for candidate URLs.
pub struct Normalizer {
    patterns: Arc<PatternSet>,
    prober: Arc<dyn Prober>,
    negative: Option<NegativeCache>,
}

impl Normalizer {
    pub fn new(patterns: Arc<PatternSet>, prober: Arc<dyn Prober>) -> Self {
        Self { patterns, prober, negative: None }
    }

    /// Remember failed probes for `ttl` and skip re-probing the same exact URL.
    pub fn with_negative_cache(mut self, ttl: Duration) -> Self {
        self.negative = Some(NegativeCache::new(ttl));
        self
    }

    /// Whether `url` is subject to normalization at all.
    pub fn is_eligible(&self, url: &str) -> bool {
        self.patterns.is_match(url)
    }

    /// Decide the cache key for one URL.
    pub async fn normalize(&self, url: &str) -> Normalization {
        let redacted = strip_query(url);

        let Some(pattern) = self.patterns.find(url) else {
            tracing::debug!(url = redacted, "no pattern matched");
            return Normalization::PassThrough;
        };

        if let Err(e) = parse_candidate(url) {
            tracing::warn!(url = redacted, error = %e, "matched URL is not probeable");
            return Normalization::PassThrough;
        }

        if let Some(negative) = &self.negative
            && negative.is_denied(url).await
        {
            tracing::debug!(url = redacted, "recent probe failure remembered");
            return Normalization::PassThrough;
        }

        match self.prober.probe(url).await {
            Ok(StatusCode::OK) => {
                tracing::debug!(url = redacted, pattern, "probe authorized, normalizing");
                Normalization::Normalized(redacted.to_string())
            }
            Ok(status) => {
                tracing::info!(url = redacted, status = status.as_u16(), "probe not authorized");
                self.remember_failure(url).await;
                Normalization::PassThrough
            }
            Err(e) => {
                tracing::warn!(url = redacted, error_code = e.code(), error = %e, "probe failed");
                self.remember_failure(url).await;
                Normalization::PassThrough
            }
        }
    }

    /// Answer one helper line. Returns `None` when there is nothing to answer.
    pub async fn handle_line(&self, line: &str) -> Option<Directive> {
        let request = match parse_line(line) {
            Ok(request) => request,
            Err(e) => return reject(&e),
        };

        let directive = match self.normalize(request.url).await {
            Normalization::Normalized(store_id) => Directive::store(request.channel, store_id),
            Normalization::PassThrough => Directive::pass(request.channel),
        };
        Some(directive)
    }

    /// Answer one raw helper line as read from the input stream.
    pub async fn handle_raw_line(&self, raw: &[u8], truncated: bool) -> Option<Directive> {
        match decode_line(raw, truncated) {
            Ok(line) => self.handle_line(line).await,
            Err(e) => reject(&e),
        }
    }

    /// The negative probe cache, when enabled.
    pub fn negative_cache(&self) -> Option<&NegativeCache> {
        self.negative.as_ref()
    }

    async fn remember_failure(&self, url: &str) {
        if let Some(negative) = &self.negative {
            negative.record_failure(url).await;
        }
    }
}

/// Answer for a line that cannot be served: a bare `OK` on its channel, or
/// nothing when there is no channel and no content to answer.
fn reject(err: &LineError) -> Option<Directive> {
    match err {
        LineError::Empty => {
            tracing::warn!("empty helper line skipped");
            None
        }
        LineError::MissingUrl { .. } => {
            tracing::warn!(channel = err.channel(), error = %err, "helper line without URL");
            Some(Directive::pass(err.channel()))
        }
        LineError::NotUtf8 { channel } | LineError::TooLong { channel } => {
            tracing::warn!(channel = channel.as_deref(), error = %err, "malformed helper line");
            channel.as_deref().map(|ch| Directive::pass(Some(ch)))
        }
    }
}

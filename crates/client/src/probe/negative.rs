//! Negative cache for failed authorization probes.
//!
//! Remembers exact URLs (signature included) whose probe did not return
//! `200 OK`, so a burst of identical candidates is not probed repeatedly.
//! Successes are never stored here: a store-id is only ever issued after a
//! live probe.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Entries beyond this count trigger a sweep of expired entries on insert.
const SWEEP_THRESHOLD: usize = 10_000;

/// In-memory TTL set of URLs whose probe failed.
///
/// Uses a HashMap behind a tokio RwLock for concurrent access.
#[derive(Debug, Clone)]
pub struct NegativeCache {
    entries: Arc<RwLock<HashMap<String, Instant>>>,
    ttl: Duration,
}

impl NegativeCache {
    /// Create an empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())), ttl }
    }

    /// Whether a failure for this exact URL is still remembered.
    pub async fn is_denied(&self, url: &str) -> bool {
        {
            let entries = self.entries.read().await;
            match entries.get(url) {
                None => return false,
                Some(failed_at) if failed_at.elapsed() <= self.ttl => return true,
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if let Some(failed_at) = entries.get(url)
            && failed_at.elapsed() > self.ttl
        {
            entries.remove(url);
        }
        false
    }

    /// Remember a failed probe for this exact URL.
    pub async fn record_failure(&self, url: &str) {
        let mut entries = self.entries.write().await;
        if entries.len() >= SWEEP_THRESHOLD {
            let ttl = self.ttl;
            entries.retain(|_, failed_at| failed_at.elapsed() <= ttl);
        }
        entries.insert(url.to_string(), Instant::now());
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, failed_at| failed_at.elapsed() <= ttl);
        before - entries.len()
    }

    /// Sweep expired entries once per TTL on a background task.
    ///
    /// Entries for URLs that are never seen again would otherwise stay until
    /// the insert-time sweep threshold is reached.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.ttl);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = cache.cleanup_expired().await;
                if removed > 0 {
                    tracing::debug!(removed, "expired negative probe entries swept");
                }
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

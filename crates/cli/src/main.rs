//! layercache-storeid entry point.
//!
//! Store-id helper for the caching proxy: reads one candidate URL per line on
//! stdin and answers on stdout. Logging goes to stderr so it never mixes with
//! helper replies.

use std::sync::Arc;

use anyhow::{Context, Result};
use layercache_client::{HttpProber, Normalizer, ProbeConfig, serve_lines};
use layercache_core::AppConfig;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    let patterns = Arc::new(config.pattern_set()?);
    let prober = HttpProber::new(ProbeConfig::from(&config))?;

    let mut normalizer = Normalizer::new(patterns.clone(), Arc::new(prober));
    if let Some(ttl) = config.negative_cache_ttl() {
        normalizer = normalizer.with_negative_cache(ttl);
    }
    if let Some(negative) = normalizer.negative_cache() {
        negative.spawn_sweeper();
    }

    tracing::info!(
        patterns = patterns.len(),
        probe_timeout_ms = config.probe_timeout_ms,
        max_in_flight = config.max_in_flight,
        "Starting store-id helper on stdio"
    );

    serve_lines(
        Arc::new(normalizer),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        config.max_in_flight,
    )
    .await?;

    Ok(())
}

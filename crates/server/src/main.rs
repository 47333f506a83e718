//! layercache-icap entry point.
//!
//! Boots the ICAP REQMOD service the caching proxy consults before deciding
//! whether a request is cacheable. Logging goes to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use layercache_core::AppConfig;
use layercache_server::{IcapService, server};
use tokio::net::TcpListener;
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
    let service = Arc::new(IcapService::from_config(&config, patterns.clone()));

    let addr = config.icap_listen_addr()?;
    let listener = TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;

    tracing::info!(
        %addr,
        service = service.name(),
        patterns = patterns.len(),
        "Starting ICAP adapter"
    );

    tokio::select! {
        result = server::serve(listener, service) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    Ok(())
}

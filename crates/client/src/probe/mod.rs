//! Authorization probes against CDN redirect URLs.
//!
//! ### Probe policy
//! - One GET to the exact candidate URL, signature and credentials intact.
//! - Only the status line matters; the body is never read.
//! - Redirects are not followed, so a 3xx never counts as authorized.
//! - Bounded by a total timeout; no retries.
//!
//! The policy lives behind the `Prober` trait so the store-id logic can be
//! exercised without a network.

pub mod negative;
pub mod url;

use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};

pub use negative::NegativeCache;
pub use url::{UrlError, parse_candidate, strip_query};

use layercache_core::{AppConfig, Error};

/// Performs a GET and reports the response status.
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    /// Probe `url` exactly as given.
    async fn probe(&self, url: &str) -> Result<StatusCode, Error>;
}

/// Configuration for the HTTP prober.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// User agent string (default: "layercache/0.1")
    pub user_agent: String,

    /// Total request timeout (default: 5s)
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { user_agent: "layercache/0.1".to_string(), timeout: Duration::from_millis(5000) }
    }
}

impl From<&AppConfig> for ProbeConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.probe_timeout() }
    }
}

/// reqwest-backed prober. Cheap to share; the connection pool is internal.
#[derive(Debug, Clone)]
pub struct HttpProber {
    http: Client,
    config: ProbeConfig,
}

impl HttpProber {
    /// Create a new prober with the given configuration.
    pub fn new(config: ProbeConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Client(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> Result<StatusCode, Error> {
        let start = Instant::now();

        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::ProbeTimeout(format!("{} after {:?}", strip_query(url), self.config.timeout))
            } else {
                Error::ProbeFailed(format!("{}: {}", strip_query(url), e.without_url()))
            }
        })?;

        let status = response.status();
        drop(response);

        tracing::debug!(
            url = strip_query(url),
            status = status.as_u16(),
            probe_ms = start.elapsed().as_millis() as u64,
            "probe finished"
        );

        Ok(status)
    }
}

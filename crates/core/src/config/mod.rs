//! Application configuration with layered loading.
//!
//! Both helpers load the same `AppConfig` so that their pattern lists never
//! diverge. Configuration is merged with figment from:
//!
//! 1. Environment variables (LAYERCACHE_*)
//! 2. TOML config file (if LAYERCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::net::SocketAddr;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::patterns::{DEFAULT_PATTERNS, PatternError, PatternSet};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (LAYERCACHE_*)
/// 2. TOML config file (if LAYERCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ordered regular expressions describing content-addressable URL shapes.
    ///
    /// Best set from the TOML file; regexes rarely survive env quoting.
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,

    /// Authorization probe timeout in milliseconds.
    ///
    /// Set via LAYERCACHE_PROBE_TIMEOUT_MS environment variable.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// User-Agent sent with authorization probes.
    ///
    /// Set via LAYERCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upper bound on store-id lines being processed concurrently.
    ///
    /// Set via LAYERCACHE_MAX_IN_FLIGHT environment variable.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// How long a failed probe is remembered, in seconds. 0 disables it.
    ///
    /// Set via LAYERCACHE_NEGATIVE_CACHE_TTL_SECS environment variable.
    #[serde(default)]
    pub negative_cache_ttl_secs: u64,

    /// Listen address of the ICAP adapter.
    ///
    /// Set via LAYERCACHE_ICAP_LISTEN environment variable.
    #[serde(default = "default_icap_listen")]
    pub icap_listen: String,

    /// ICAP service name, the path component of `icap://host:port/<service>`.
    ///
    /// Set via LAYERCACHE_ICAP_SERVICE environment variable.
    #[serde(default = "default_icap_service")]
    pub icap_service: String,

    /// ICAP service tag. Change it whenever the pattern list changes.
    ///
    /// Set via LAYERCACHE_ISTAG environment variable.
    #[serde(default = "default_istag")]
    pub istag: String,
}

fn default_patterns() -> Vec<String> {
    DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_user_agent() -> String {
    "layercache/0.1".into()
}

fn default_max_in_flight() -> usize {
    256
}

fn default_icap_listen() -> String {
    "127.0.0.1:1344".into()
}

fn default_icap_service() -> String {
    "strip-auth".into()
}

fn default_istag() -> String {
    "layercache-1".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
            probe_timeout_ms: default_probe_timeout_ms(),
            user_agent: default_user_agent(),
            max_in_flight: default_max_in_flight(),
            negative_cache_ttl_secs: 0,
            icap_listen: default_icap_listen(),
            icap_service: default_icap_service(),
            istag: default_istag(),
        }
    }
}

impl AppConfig {
    /// Probe timeout as Duration for use with reqwest.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Negative cache TTL, `None` when disabled.
    pub fn negative_cache_ttl(&self) -> Option<Duration> {
        (self.negative_cache_ttl_secs > 0).then(|| Duration::from_secs(self.negative_cache_ttl_secs))
    }

    /// Compile the configured pattern list.
    ///
    /// # Errors
    ///
    /// Returns `PatternError` if any pattern is empty or fails to compile.
    pub fn pattern_set(&self) -> Result<PatternSet, PatternError> {
        PatternSet::new(&self.patterns)
    }

    /// Parsed ICAP listen address.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `icap_listen` is not a socket address.
    pub fn icap_listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.icap_listen.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            field: "icap_listen".into(),
            reason: e.to_string(),
        })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `LAYERCACHE_`
    /// 2. TOML file from `LAYERCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("LAYERCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("LAYERCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

/// ICAP limits ISTag values to 32 characters (RFC 3507 section 4.7).
const MAX_ISTAG_LEN: usize = 32;

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - any pattern fails to compile
    /// - `probe_timeout_ms` is less than 100ms or exceeds 60 seconds
    /// - `user_agent` is empty
    /// - `max_in_flight` is 0
    /// - `negative_cache_ttl_secs` exceeds one hour
    /// - `icap_listen` is not a socket address
    /// - `icap_service` is empty or contains `/`
    /// - `istag` is empty or longer than 32 characters
    pub fn validate(&self) -> Result<(), ConfigError> {
        let patterns = self
            .pattern_set()
            .map_err(|e| ConfigError::Invalid { field: "patterns".into(), reason: e.to_string() })?;
        if patterns.is_empty() {
            tracing::warn!("no URL patterns configured; every request will pass through unchanged");
        }

        if self.probe_timeout_ms < 100 {
            return Err(ConfigError::Invalid {
                field: "probe_timeout_ms".into(),
                reason: "must be at least 100ms".into(),
            });
        }
        if self.probe_timeout_ms > 60_000 {
            return Err(ConfigError::Invalid {
                field: "probe_timeout_ms".into(),
                reason: "must not exceed 60 seconds (60000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.max_in_flight == 0 {
            return Err(ConfigError::Invalid { field: "max_in_flight".into(), reason: "must be greater than 0".into() });
        }

        if self.negative_cache_ttl_secs > 3600 {
            return Err(ConfigError::Invalid {
                field: "negative_cache_ttl_secs".into(),
                reason: "must not exceed 1 hour (3600s)".into(),
            });
        }

        self.icap_listen_addr()?;

        if self.icap_service.is_empty() || self.icap_service.contains('/') {
            return Err(ConfigError::Invalid {
                field: "icap_service".into(),
                reason: "must be a single non-empty path segment".into(),
            });
        }

        if self.istag.is_empty() || self.istag.len() > MAX_ISTAG_LEN {
            return Err(ConfigError::Invalid { field: "istag".into(), reason: "must be 1 to 32 characters".into() });
        }

        Ok(())
    }
}

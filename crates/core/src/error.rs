//! Unified error types for the layercache helpers.
//!
//! None of these ever reach the caching engine as a failure: every caller
//! resolves them to the conservative protocol answer and logs the code.

use crate::config::ConfigError;
use crate::patterns::PatternError;

/// Unified error type for both helpers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Helper protocol input that cannot be interpreted.
    #[error("MALFORMED_INPUT: {0}")]
    MalformedInput(String),

    /// Configuration could not be loaded or validated.
    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),

    /// A URL pattern failed to compile.
    #[error("PATTERN_ERROR: {0}")]
    Pattern(#[from] PatternError),

    /// The probe HTTP client could not be constructed.
    #[error("CLIENT_ERROR: {0}")]
    Client(String),

    /// Authorization probe exceeded its timeout.
    #[error("PROBE_TIMEOUT: {0}")]
    ProbeTimeout(String),

    /// Authorization probe failed at the network level.
    #[error("PROBE_FAILED: {0}")]
    ProbeFailed(String),

    /// I/O on the helper channel failed.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable code used as the `error_code` field in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Error::MalformedInput(_) => "MALFORMED_INPUT",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Pattern(_) => "PATTERN_ERROR",
            Error::Client(_) => "CLIENT_ERROR",
            Error::ProbeTimeout(_) => "PROBE_TIMEOUT",
            Error::ProbeFailed(_) => "PROBE_FAILED",
            Error::Io(_) => "IO_ERROR",
        }
    }
}

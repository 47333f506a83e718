//! Core types shared by the layercache helpers.
//!
//! This crate provides:
//! - Layered configuration shared by the store-id helper and the ICAP adapter
//! - The pattern registry that decides which URLs are content-addressable
//! - Unified error types

pub mod config;
pub mod error;
pub mod patterns;

pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use patterns::{PatternError, PatternSet, strip_query};

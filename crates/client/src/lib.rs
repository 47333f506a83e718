//! Client side of the layercache store-id helper.
//!
//! This crate provides the authorization probe, the store-id line protocol
//! and the concurrent line driver used by the `layercache-storeid` binary.

pub mod probe;
pub mod storeid;

pub use probe::{HttpProber, NegativeCache, ProbeConfig, Prober};
pub use storeid::{Directive, HelperRequest, LineError, Normalization, Normalizer, parse_line, serve_lines};

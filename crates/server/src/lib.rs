//! ICAP pre-cache header adapter for layercache.
//!
//! This crate provides the ICAP codec, the `strip-auth` service that removes
//! `Authorization` from the cache-decision copy of matching requests, and the
//! TCP server used by the `layercache-icap` binary.

pub mod adapter;
pub mod error;
pub mod icap;
pub mod server;
pub mod service;

pub use adapter::{AdaptRequest, Adaptation, HeaderAdapter};
pub use error::IcapError;
pub use service::IcapService;

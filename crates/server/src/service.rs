//! The `strip-auth` ICAP service.
//!
//! Maps parsed ICAP requests to responses. Anything that goes wrong while
//! looking at the encapsulated request resolves to "no modification".

use std::sync::Arc;

use layercache_core::{AppConfig, PatternSet};

use crate::adapter::{Adaptation, HeaderAdapter};
use crate::icap::http::{encode_request_head, parse_request_head};
use crate::icap::{BodyState, IcapMethod, IcapRequest, IcapResponse, IcapStatus};

/// Adaptation points advertised in OPTIONS.
const ADAPTATION_POINTS: &str = "pre-cache, request-only, no-body";

/// Marks a modified request head as meant for cache admission only.
const ADAPTATION_SCOPE: &str = "cache-admission";

/// How long clients may cache the OPTIONS answer, in seconds.
const OPTIONS_TTL: u64 = 3600;

/// ICAP service wrapping the header adapter.
#[derive(Debug, Clone)]
pub struct IcapService {
    adapter: HeaderAdapter,
    name: String,
    istag: String,
}

impl IcapService {
    pub fn new(adapter: HeaderAdapter, name: impl Into<String>, istag: impl Into<String>) -> Self {
        Self { adapter, name: name.into(), istag: format!("\"{}\"", istag.into()) }
    }

    pub fn from_config(config: &AppConfig, patterns: Arc<PatternSet>) -> Self {
        Self::new(HeaderAdapter::new(patterns), &config.icap_service, &config.istag)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Answer one request.
    pub fn respond(&self, request: &IcapRequest) -> IcapResponse {
        if request.service().as_deref() != Some(self.name.as_str()) {
            tracing::warn!(uri = %request.uri, "unknown ICAP service");
            return self.status(IcapStatus::ServiceNotFound).closing();
        }

        let response = match &request.method {
            IcapMethod::Options => self.options(),
            IcapMethod::Reqmod => self.reqmod(request),
            IcapMethod::Other(method) => {
                tracing::warn!(method, "unsupported ICAP method");
                self.status(IcapStatus::MethodNotAllowed).closing()
            }
        };

        if request.wants_close() { response.closing() } else { response }
    }

    /// Response for a message that could not be parsed.
    pub fn error_response(&self, status: IcapStatus) -> IcapResponse {
        self.status(status).closing()
    }

    fn status(&self, status: IcapStatus) -> IcapResponse {
        IcapResponse::new(status).header("ISTag", self.istag.clone())
    }

    fn options(&self) -> IcapResponse {
        self.status(IcapStatus::Ok)
            .header("Methods", "REQMOD")
            .header("Service", format!("layercache {}", env!("CARGO_PKG_VERSION")))
            .header("Service-ID", self.name.clone())
            .header("Allow", "204")
            .header("Preview", "0")
            .header("Transfer-Ignore", "*")
            .header("Options-TTL", OPTIONS_TTL.to_string())
            .header("X-Adaptation-Points", ADAPTATION_POINTS)
    }

    fn reqmod(&self, request: &IcapRequest) -> IcapResponse {
        let Some(raw) = &request.req_hdr else {
            tracing::warn!("REQMOD without an encapsulated request head");
            return self.status(IcapStatus::BadRequest).closing();
        };

        match request.body {
            BodyState::Absent => {}
            BodyState::PreviewDrained { .. } => {
                tracing::debug!("request carries a body, leaving it unmodified");
                return self.status(IcapStatus::NoContent);
            }
            BodyState::Unread if request.allows_204() => {
                tracing::debug!("request carries a body without preview, leaving it unmodified");
                return self.status(IcapStatus::NoContent).closing();
            }
            BodyState::Unread => {
                tracing::warn!("request body without preview or Allow: 204 cannot be answered");
                return self.status(IcapStatus::BadRequest).closing();
            }
        }

        let http = match parse_request_head(raw) {
            Ok(http) => http,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable encapsulated request, leaving it unmodified");
                return self.unchanged(request);
            }
        };

        match self.adapter.adapt(&http) {
            Adaptation::Unchanged => self.unchanged(request),
            Adaptation::HeaderAdjusted(headers) => self
                .status(IcapStatus::Ok)
                .header("X-Adaptation-Scope", ADAPTATION_SCOPE)
                .with_req_hdr(encode_request_head(&http, &headers).freeze()),
        }
    }

    /// 204 where allowed, otherwise echo the request head byte for byte.
    fn unchanged(&self, request: &IcapRequest) -> IcapResponse {
        match &request.req_hdr {
            Some(raw) if !request.allows_204() => self.status(IcapStatus::Ok).with_req_hdr(raw.clone()),
            _ => self.status(IcapStatus::NoContent),
        }
    }
}

//! Structured errors for the ICAP adapter.
//!
//! Each maps to the ICAP status sent back before the connection is closed.

use crate::icap::IcapStatus;

/// Errors raised while reading an ICAP message.
#[derive(Debug, thiserror::Error)]
pub enum IcapError {
    /// Peer closed the connection in the middle of a message.
    #[error("connection closed mid-message")]
    UnexpectedEof,

    /// A header section exceeded the size limit.
    #[error("header section exceeds {0} bytes")]
    HeadTooLarge(usize),

    /// The ICAP request line could not be parsed.
    #[error("malformed request line: {0}")]
    BadRequestLine(String),

    /// Only ICAP/1.0 is spoken.
    #[error("unsupported ICAP version: {0}")]
    UnsupportedVersion(String),

    /// An ICAP or encapsulated HTTP header could not be parsed.
    #[error("malformed header: {0}")]
    BadHeader(String),

    /// The Encapsulated header is missing or inconsistent.
    #[error("malformed Encapsulated header: {0}")]
    BadEncapsulated(String),

    /// A preview chunk could not be parsed.
    #[error("malformed chunk: {0}")]
    BadChunk(String),

    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IcapError {
    /// Status to answer with, `None` when the peer can no longer be answered.
    pub fn status(&self) -> Option<IcapStatus> {
        match self {
            IcapError::UnexpectedEof | IcapError::Io(_) => None,
            IcapError::UnsupportedVersion(_) => Some(IcapStatus::VersionNotSupported),
            IcapError::HeadTooLarge(_)
            | IcapError::BadRequestLine(_)
            | IcapError::BadHeader(_)
            | IcapError::BadEncapsulated(_)
            | IcapError::BadChunk(_) => Some(IcapStatus::BadRequest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IcapError::BadEncapsulated("req-hdr=x".to_string());
        assert!(err.to_string().contains("Encapsulated"));
        assert!(err.to_string().contains("req-hdr=x"));
    }

    #[test]
    fn test_error_status() {
        assert_eq!(IcapError::BadHeader("x".into()).status(), Some(IcapStatus::BadRequest));
        assert_eq!(IcapError::UnsupportedVersion("ICAP/2.0".into()).status(), Some(IcapStatus::VersionNotSupported));
        assert_eq!(IcapError::UnexpectedEof.status(), None);
    }
}

//! Store-id helper line protocol.
//!
//! Request: `[<channel-id> ]<url>[ <extras>...]`
//! Reply:   `[<channel-id> ]OK[ store-id=<url-without-query>]`

use std::fmt;

use layercache_core::Error;

/// Longest helper line served; longer lines are answered without a store-id.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Error type for helper lines that cannot be served.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    /// Nothing but whitespace; there is nobody to answer.
    #[error("empty line")]
    Empty,

    /// A channel id without a URL. Still answered so the channel unblocks.
    #[error("channel {channel}: missing URL")]
    MissingUrl { channel: String },

    /// Raw bytes that are not UTF-8.
    #[error("line is not valid UTF-8")]
    NotUtf8 { channel: Option<String> },

    /// Longer than `MAX_LINE_BYTES`; the rest of the line was discarded.
    #[error("line exceeds {MAX_LINE_BYTES} bytes")]
    TooLong { channel: Option<String> },
}

impl LineError {
    /// Channel id to echo when answering the bad line, if one was readable.
    pub fn channel(&self) -> Option<&str> {
        match self {
            LineError::Empty => None,
            LineError::MissingUrl { channel } => Some(channel),
            LineError::NotUtf8 { channel } | LineError::TooLong { channel } => channel.as_deref(),
        }
    }
}

impl From<LineError> for Error {
    fn from(err: LineError) -> Self {
        Error::MalformedInput(err.to_string())
    }
}

/// One parsed helper request, borrowing from the input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelperRequest<'a> {
    /// Concurrency channel id, echoed verbatim in the reply.
    pub channel: Option<&'a str>,
    /// Full request URL including its query string.
    pub url: &'a str,
}

/// Parse one helper input line. Fields after the URL are ignored.
pub fn parse_line(line: &str) -> Result<HelperRequest<'_>, LineError> {
    let mut fields = line.split_whitespace();
    let first = fields.next().ok_or(LineError::Empty)?;

    if first.bytes().all(|b| b.is_ascii_digit()) {
        let url = fields.next().ok_or_else(|| LineError::MissingUrl { channel: first.to_string() })?;
        return Ok(HelperRequest { channel: Some(first), url });
    }

    Ok(HelperRequest { channel: None, url: first })
}

/// Decode one raw input line. `truncated` marks a line cut at `MAX_LINE_BYTES`.
///
/// A leading numeric channel id is recovered from rejected lines so the
/// engine still gets an answer on that channel.
pub fn decode_line(raw: &[u8], truncated: bool) -> Result<&str, LineError> {
    if truncated {
        return Err(LineError::TooLong { channel: leading_channel(raw) });
    }
    std::str::from_utf8(raw).map_err(|_| LineError::NotUtf8 { channel: leading_channel(raw) })
}

fn leading_channel(raw: &[u8]) -> Option<String> {
    let start = raw.iter().position(|b| !b.is_ascii_whitespace())?;
    let field = &raw[start..];
    let end = field.iter().position(|b| b.is_ascii_whitespace())?;
    let field = &field[..end];

    // ASCII digits only, so the bytes are valid UTF-8.
    field.iter().all(u8::is_ascii_digit).then(|| String::from_utf8_lossy(field).into_owned())
}

/// One helper reply line, without the trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub channel: Option<String>,
    pub store_id: Option<String>,
}

impl Directive {
    /// Keep the engine's default key for this request.
    pub fn pass(channel: Option<&str>) -> Self {
        Self { channel: channel.map(str::to_string), store_id: None }
    }

    /// Use `store_id` as this request's cache key.
    pub fn store(channel: Option<&str>, store_id: impl Into<String>) -> Self {
        Self { channel: channel.map(str::to_string), store_id: Some(store_id.into()) }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(channel) = &self.channel {
            write!(f, "{channel} ")?;
        }
        f.write_str("OK")?;
        if let Some(store_id) = &self.store_id {
            write!(f, " store-id={store_id}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_only() {
        let req = parse_line("http://x/y").unwrap();
        assert_eq!(req, HelperRequest { channel: None, url: "http://x/y" });
    }

    #[test]
    fn test_parse_channel_and_url() {
        let req = parse_line("42 http://x/y?sig=1").unwrap();
        assert_eq!(req, HelperRequest { channel: Some("42"), url: "http://x/y?sig=1" });
    }

    #[test]
    fn test_parse_ignores_extra_fields() {
        let req = parse_line("7 https://x/y?a=1 10.0.0.1/- - GET myip=- myport=3128").unwrap();
        assert_eq!(req.channel, Some("7"));
        assert_eq!(req.url, "https://x/y?a=1");

        let req = parse_line("https://x/y extra fields").unwrap();
        assert_eq!(req.channel, None);
        assert_eq!(req.url, "https://x/y");
    }

    #[test]
    fn test_parse_tolerates_surrounding_whitespace() {
        let req = parse_line("  3\thttps://x/y  \r").unwrap();
        assert_eq!(req, HelperRequest { channel: Some("3"), url: "https://x/y" });
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse_line(""), Err(LineError::Empty));
        assert_eq!(parse_line("   \t"), Err(LineError::Empty));
    }

    #[test]
    fn test_parse_channel_without_url() {
        assert_eq!(parse_line("12"), Err(LineError::MissingUrl { channel: "12".into() }));
    }

    #[test]
    fn test_directive_display() {
        assert_eq!(Directive::pass(None).to_string(), "OK");
        assert_eq!(Directive::pass(Some("5")).to_string(), "5 OK");
        assert_eq!(Directive::store(None, "http://x/y").to_string(), "OK store-id=http://x/y");
        assert_eq!(Directive::store(Some("42"), "http://x/y").to_string(), "42 OK store-id=http://x/y");
    }

    #[test]
    fn test_decode_valid_line() {
        assert_eq!(decode_line(b"4 http://x/y\n", false), Ok("4 http://x/y\n"));
    }

    #[test]
    fn test_decode_invalid_utf8_keeps_channel() {
        let err = decode_line(b"2 https://x/\xff\xfe?x=1\n", false).unwrap_err();
        assert_eq!(err, LineError::NotUtf8 { channel: Some("2".into()) });
        assert_eq!(err.channel(), Some("2"));

        let err = decode_line(b"https://x/\xff\n", false).unwrap_err();
        assert_eq!(err.channel(), None);

        let err = decode_line(b"\xff\xfe", false).unwrap_err();
        assert_eq!(err.channel(), None);
    }

    #[test]
    fn test_decode_truncated_line() {
        let err = decode_line(b" 9 https://x/aaaa", true).unwrap_err();
        assert_eq!(err, LineError::TooLong { channel: Some("9".into()) });

        // The cut may fall inside the channel field.
        let err = decode_line(b"123", true).unwrap_err();
        assert_eq!(err.channel(), None);
    }

    #[test]
    fn test_line_error_into_core_error() {
        let err: Error = LineError::Empty.into();
        assert_eq!(err.code(), "MALFORMED_INPUT");
    }
}

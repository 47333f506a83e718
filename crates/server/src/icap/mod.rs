//! ICAP/1.0 message codec (RFC 3507 subset).
//!
//! Only what a REQMOD header adapter needs:
//! - `OPTIONS` and `REQMOD` requests, other methods are parsed and refused
//! - the encapsulated HTTP request head is read in full
//! - request bodies are never read, except for draining a preview
//! - responses carry at most an HTTP request head, never a body

pub mod encapsulated;
pub mod http;

use std::fmt;

use ::http::{HeaderMap, HeaderName, HeaderValue};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::IcapError;

pub use encapsulated::{Encapsulated, Section};

/// Limit on every header section, ICAP and encapsulated HTTP alike.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

const MAX_ICAP_HEADERS: usize = 64;

/// Limit on a single preview chunk-size line.
const MAX_CHUNK_LINE: usize = 1024;

/// ICAP response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcapStatus {
    Ok,
    NoContent,
    BadRequest,
    ServiceNotFound,
    MethodNotAllowed,
    VersionNotSupported,
}

impl IcapStatus {
    pub fn code(self) -> u16 {
        match self {
            IcapStatus::Ok => 200,
            IcapStatus::NoContent => 204,
            IcapStatus::BadRequest => 400,
            IcapStatus::ServiceNotFound => 404,
            IcapStatus::MethodNotAllowed => 405,
            IcapStatus::VersionNotSupported => 505,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            IcapStatus::Ok => "OK",
            IcapStatus::NoContent => "No Content",
            IcapStatus::BadRequest => "Bad Request",
            IcapStatus::ServiceNotFound => "ICAP Service Not Found",
            IcapStatus::MethodNotAllowed => "Method Not Allowed",
            IcapStatus::VersionNotSupported => "ICAP Version Not Supported",
        }
    }
}

impl fmt::Display for IcapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// ICAP request method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcapMethod {
    Options,
    Reqmod,
    Other(String),
}

impl From<&str> for IcapMethod {
    fn from(s: &str) -> Self {
        match s {
            "OPTIONS" => IcapMethod::Options,
            "REQMOD" => IcapMethod::Reqmod,
            other => IcapMethod::Other(other.to_string()),
        }
    }
}

/// What happened to the encapsulated body while reading the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyState {
    /// No body follows the headers.
    Absent,
    /// A preview was sent and drained; the rest of the body was not requested.
    PreviewDrained { ieof: bool },
    /// A body follows without a preview and was left unread.
    Unread,
}

/// One parsed ICAP request.
#[derive(Debug, Clone)]
pub struct IcapRequest {
    pub method: IcapMethod,
    pub uri: String,
    pub headers: HeaderMap,
    /// Raw encapsulated HTTP request head, `REQMOD` only.
    pub req_hdr: Option<Bytes>,
    pub body: BodyState,
}

impl IcapRequest {
    /// Service name from the request URI path.
    pub fn service(&self) -> Option<String> {
        let url = url::Url::parse(&self.uri).ok()?;
        Some(url.path().trim_start_matches('/').to_string())
    }

    /// Whether the client accepts `204 No Content` outside a preview.
    pub fn allows_204(&self) -> bool {
        self.header_tokens("allow").any(|t| t == "204")
    }

    /// Whether the client asked to close the connection after this message.
    pub fn wants_close(&self) -> bool {
        self.header_tokens("connection").any(|t| t.eq_ignore_ascii_case("close"))
    }

    fn header_tokens<'a>(&'a self, name: &'static str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
    }
}

/// Read one ICAP request. Returns `None` on a clean EOF between messages.
///
/// # Errors
///
/// Returns `IcapError` for malformed or oversized messages and socket failures.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<IcapRequest>, IcapError>
where
    R: AsyncBufRead + Unpin,
{
    let Some(head) = read_head(reader).await? else {
        return Ok(None);
    };

    let line_end = head
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or_else(|| IcapError::BadRequestLine("missing CRLF".into()))?;
    let request_line =
        std::str::from_utf8(&head[..line_end]).map_err(|_| IcapError::BadRequestLine("not UTF-8".into()))?;

    let mut parts = request_line.split(' ').filter(|p| !p.is_empty());
    let (Some(method), Some(uri), Some(version), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
        return Err(IcapError::BadRequestLine(request_line.to_string()));
    };
    if version != "ICAP/1.0" {
        return Err(IcapError::UnsupportedVersion(version.to_string()));
    }

    let headers = parse_icap_headers(&head[line_end + 2..])?;
    let method = IcapMethod::from(method);
    let uri = uri.to_string();

    if method != IcapMethod::Reqmod {
        return Ok(Some(IcapRequest { method, uri, headers, req_hdr: None, body: BodyState::Absent }));
    }

    let encapsulated: Encapsulated = headers
        .get("encapsulated")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| IcapError::BadEncapsulated("missing".into()))?
        .parse()?;
    if encapsulated.has_res_hdr() {
        return Err(IcapError::BadEncapsulated("res-hdr in REQMOD".into()));
    }

    let req_hdr = match encapsulated.req_hdr_len() {
        Some(len) if len > MAX_HEAD_BYTES => return Err(IcapError::HeadTooLarge(MAX_HEAD_BYTES)),
        Some(len) => {
            let mut raw = vec![0u8; len];
            reader.read_exact(&mut raw).await.map_err(eof_as_error)?;
            Some(Bytes::from(raw))
        }
        None => None,
    };

    let body = if !encapsulated.has_body() {
        BodyState::Absent
    } else if let Some(preview) = preview_size(&headers)? {
        let ieof = drain_preview(reader, preview).await?;
        BodyState::PreviewDrained { ieof }
    } else {
        BodyState::Unread
    };

    Ok(Some(IcapRequest { method, uri, headers, req_hdr, body }))
}

/// Read the ICAP head up to and including the empty line.
async fn read_head<R>(reader: &mut R) -> Result<Option<Vec<u8>>, IcapError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(512);

    loop {
        let line = read_line(reader, &mut buf, MAX_HEAD_BYTES).await?;
        if line == 0 {
            return if buf.is_empty() { Ok(None) } else { Err(IcapError::UnexpectedEof) };
        }

        // Stray CRLFs between messages are tolerated.
        if buf == b"\r\n" || buf == b"\n" {
            buf.clear();
            continue;
        }

        if buf.ends_with(b"\r\n\r\n") {
            return Ok(Some(buf));
        }
    }
}

/// Append one line to `buf`, keeping `buf` within `limit` bytes.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> Result<usize, IcapError>
where
    R: AsyncBufRead + Unpin,
{
    let remaining = limit.saturating_sub(buf.len());
    if remaining == 0 {
        return Err(IcapError::HeadTooLarge(limit));
    }

    let n = (&mut *reader).take(remaining as u64).read_until(b'\n', buf).await?;
    if n == remaining && !buf.ends_with(b"\n") {
        return Err(IcapError::HeadTooLarge(limit));
    }
    Ok(n)
}

fn parse_icap_headers(block: &[u8]) -> Result<HeaderMap, IcapError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_ICAP_HEADERS];

    let parsed = match httparse::parse_headers(block, &mut headers) {
        Ok(httparse::Status::Complete((_, parsed))) => parsed,
        Ok(httparse::Status::Partial) => return Err(IcapError::BadHeader("incomplete ICAP headers".into())),
        Err(e) => return Err(IcapError::BadHeader(format!("ICAP headers: {e}"))),
    };

    let mut map = HeaderMap::with_capacity(parsed.len());
    for header in parsed {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|e| IcapError::BadHeader(e.to_string()))?;
        let value = HeaderValue::from_bytes(header.value).map_err(|e| IcapError::BadHeader(e.to_string()))?;
        map.append(name, value);
    }
    Ok(map)
}

fn preview_size(headers: &HeaderMap) -> Result<Option<usize>, IcapError> {
    let Some(value) = headers.get("preview") else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Some)
        .ok_or_else(|| IcapError::BadHeader("Preview is not a number".into()))
}

/// Discard preview chunks up to the zero chunk. Returns whether `ieof` was set.
async fn drain_preview<R>(reader: &mut R, limit: usize) -> Result<bool, IcapError>
where
    R: AsyncBufRead + Unpin,
{
    let mut total = 0usize;

    loop {
        let mut line = Vec::new();
        if read_line(reader, &mut line, MAX_CHUNK_LINE).await? == 0 {
            return Err(IcapError::UnexpectedEof);
        }

        let text = std::str::from_utf8(&line).map_err(|_| IcapError::BadChunk("not UTF-8".into()))?.trim();
        let (size, ext) = text.split_once(';').unwrap_or((text, ""));
        let size = usize::from_str_radix(size.trim(), 16).map_err(|_| IcapError::BadChunk(text.to_string()))?;

        if size == 0 {
            expect_crlf(reader).await?;
            return Ok(ext.trim() == "ieof");
        }

        total += size;
        if total > limit {
            return Err(IcapError::BadChunk(format!("preview of {total} bytes exceeds {limit}")));
        }

        let skipped = tokio::io::copy(&mut (&mut *reader).take(size as u64), &mut tokio::io::sink()).await?;
        if skipped != size as u64 {
            return Err(IcapError::UnexpectedEof);
        }
        expect_crlf(reader).await?;
    }
}

async fn expect_crlf<R>(reader: &mut R) -> Result<(), IcapError>
where
    R: AsyncBufRead + Unpin,
{
    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf).await.map_err(eof_as_error)?;
    if &crlf != b"\r\n" {
        return Err(IcapError::BadChunk("missing CRLF after chunk".into()));
    }
    Ok(())
}

fn eof_as_error(e: std::io::Error) -> IcapError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof { IcapError::UnexpectedEof } else { IcapError::Io(e) }
}

/// One ICAP response.
#[derive(Debug, Clone)]
pub struct IcapResponse {
    pub status: IcapStatus,
    pub headers: Vec<(&'static str, String)>,
    /// Encapsulated HTTP request head, sent with `null-body`.
    pub req_hdr: Option<Bytes>,
    /// Close the connection after sending.
    pub close: bool,
}

impl IcapResponse {
    pub fn new(status: IcapStatus) -> Self {
        Self { status, headers: Vec::new(), req_hdr: None, close: false }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_req_hdr(mut self, req_hdr: impl Into<Bytes>) -> Self {
        self.req_hdr = Some(req_hdr.into());
        self
    }

    pub fn closing(mut self) -> Self {
        self.close = true;
        self
    }

    /// Serialize status line, headers, `Encapsulated` and any request head.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256 + self.req_hdr.as_ref().map_or(0, Bytes::len));

        buf.put_slice(format!("ICAP/1.0 {}\r\n", self.status).as_bytes());
        for (name, value) in &self.headers {
            buf.put_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        if self.close {
            buf.put_slice(b"Connection: close\r\n");
        }
        match &self.req_hdr {
            Some(req_hdr) => buf.put_slice(format!("Encapsulated: req-hdr=0, null-body={}\r\n", req_hdr.len()).as_bytes()),
            None => buf.put_slice(b"Encapsulated: null-body=0\r\n"),
        }
        buf.put_slice(b"\r\n");

        if let Some(req_hdr) = &self.req_hdr {
            buf.put_slice(req_hdr);
        }

        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQ_HDR: &str = "GET https://cdn01.example.net/blob/ab?sig=1 HTTP/1.1\r\nHost: cdn01.example.net\r\nAuthorization: Bearer X\r\n\r\n";

    fn reqmod(extra_headers: &str, encapsulated: &str, tail: &str) -> Vec<u8> {
        format!(
            "REQMOD icap://127.0.0.1:1344/strip-auth ICAP/1.0\r\nHost: 127.0.0.1\r\n{extra_headers}Encapsulated: {encapsulated}\r\n\r\n{REQ_HDR}{tail}"
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn test_read_options() {
        let raw = b"OPTIONS icap://127.0.0.1:1344/strip-auth ICAP/1.0\r\nHost: 127.0.0.1\r\nEncapsulated: null-body=0\r\n\r\n";
        let mut reader = &raw[..];

        let req = read_request(&mut reader).await.unwrap().unwrap();
        assert_eq!(req.method, IcapMethod::Options);
        assert_eq!(req.service().as_deref(), Some("strip-auth"));
        assert_eq!(req.body, BodyState::Absent);
        assert!(read_request(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_reqmod_null_body() {
        let raw = reqmod("Allow: 204\r\n", &format!("req-hdr=0, null-body={}", REQ_HDR.len()), "");
        let mut reader = &raw[..];

        let req = read_request(&mut reader).await.unwrap().unwrap();
        assert_eq!(req.method, IcapMethod::Reqmod);
        assert_eq!(req.req_hdr.as_deref(), Some(REQ_HDR.as_bytes()));
        assert_eq!(req.body, BodyState::Absent);
        assert!(req.allows_204());
        assert!(!req.wants_close());
    }

    #[tokio::test]
    async fn test_read_two_pipelined_messages() {
        let mut raw = reqmod("", &format!("req-hdr=0, null-body={}", REQ_HDR.len()), "");
        raw.extend(reqmod("Connection: close\r\n", &format!("req-hdr=0, null-body={}", REQ_HDR.len()), ""));
        let mut reader = &raw[..];

        let first = read_request(&mut reader).await.unwrap().unwrap();
        assert!(!first.allows_204());
        let second = read_request(&mut reader).await.unwrap().unwrap();
        assert!(second.wants_close());
        assert!(read_request(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_reqmod_drains_zero_preview() {
        let raw = reqmod("Preview: 0\r\n", &format!("req-hdr=0, req-body={}", REQ_HDR.len()), "0; ieof\r\n\r\nNEXT");
        let mut reader = &raw[..];

        let req = read_request(&mut reader).await.unwrap().unwrap();
        assert_eq!(req.body, BodyState::PreviewDrained { ieof: true });
        assert_eq!(reader, b"NEXT");
    }

    #[tokio::test]
    async fn test_read_reqmod_drains_nonzero_preview() {
        let raw = reqmod("Preview: 8\r\n", &format!("req-hdr=0, req-body={}", REQ_HDR.len()), "5\r\nhello\r\n3\r\nabc\r\n0\r\n\r\n");
        let mut reader = &raw[..];

        let req = read_request(&mut reader).await.unwrap().unwrap();
        assert_eq!(req.body, BodyState::PreviewDrained { ieof: false });
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn test_read_reqmod_preview_overflow() {
        let raw = reqmod("Preview: 2\r\n", &format!("req-hdr=0, req-body={}", REQ_HDR.len()), "5\r\nhello\r\n0\r\n\r\n");
        let mut reader = &raw[..];

        assert!(matches!(read_request(&mut reader).await, Err(IcapError::BadChunk(_))));
    }

    #[tokio::test]
    async fn test_read_reqmod_body_without_preview_left_unread() {
        let raw = reqmod("", &format!("req-hdr=0, req-body={}", REQ_HDR.len()), "5\r\nhello\r\n0\r\n\r\n");
        let mut reader = &raw[..];

        let req = read_request(&mut reader).await.unwrap().unwrap();
        assert_eq!(req.body, BodyState::Unread);
    }

    #[tokio::test]
    async fn test_read_skips_stray_crlf() {
        let mut raw = b"\r\n".to_vec();
        raw.extend(reqmod("", &format!("req-hdr=0, null-body={}", REQ_HDR.len()), ""));
        let mut reader = &raw[..];

        assert!(read_request(&mut reader).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_read_rejects_wrong_version() {
        let raw = b"OPTIONS icap://h/strip-auth ICAP/2.0\r\n\r\n";
        let mut reader = &raw[..];
        assert!(matches!(read_request(&mut reader).await, Err(IcapError::UnsupportedVersion(_))));
    }

    #[tokio::test]
    async fn test_read_rejects_bad_request_line() {
        let raw = b"REQMOD\r\n\r\n";
        let mut reader = &raw[..];
        assert!(matches!(read_request(&mut reader).await, Err(IcapError::BadRequestLine(_))));
    }

    #[tokio::test]
    async fn test_read_rejects_missing_encapsulated() {
        let raw = b"REQMOD icap://h/strip-auth ICAP/1.0\r\nHost: h\r\n\r\n";
        let mut reader = &raw[..];
        assert!(matches!(read_request(&mut reader).await, Err(IcapError::BadEncapsulated(_))));
    }

    #[tokio::test]
    async fn test_read_rejects_req_hdr_not_at_body_start() {
        let raw = reqmod("Allow: 204\r\n", &format!("req-hdr=5, null-body={}", REQ_HDR.len() + 5), "");
        let mut reader = &raw[..];
        assert!(matches!(read_request(&mut reader).await, Err(IcapError::BadEncapsulated(_))));
    }

    #[tokio::test]
    async fn test_read_truncated_message() {
        let raw = reqmod("", "req-hdr=0, null-body=9999", "");
        let mut reader = &raw[..];
        assert!(matches!(read_request(&mut reader).await, Err(IcapError::UnexpectedEof)));

        let raw = b"OPTIONS icap://h/strip-auth ICAP/1.0\r\nHost: h\r\n";
        let mut reader = &raw[..];
        assert!(matches!(read_request(&mut reader).await, Err(IcapError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_read_rejects_oversized_head() {
        let mut raw = b"OPTIONS icap://h/strip-auth ICAP/1.0\r\n".to_vec();
        raw.extend(format!("X-Big: {}\r\n\r\n", "a".repeat(MAX_HEAD_BYTES)).into_bytes());
        let mut reader = &raw[..];
        assert!(matches!(read_request(&mut reader).await, Err(IcapError::HeadTooLarge(_))));
    }

    #[test]
    fn test_encode_no_content() {
        let encoded = IcapResponse::new(IcapStatus::NoContent).header("ISTag", "\"t1\"").encode();
        assert_eq!(&encoded[..], b"ICAP/1.0 204 No Content\r\nISTag: \"t1\"\r\nEncapsulated: null-body=0\r\n\r\n");
    }

    #[test]
    fn test_encode_with_req_hdr_and_close() {
        let head = "GET http://x/ HTTP/1.1\r\nHost: x\r\n\r\n";
        let encoded = IcapResponse::new(IcapStatus::Ok).with_req_hdr(head.as_bytes().to_vec()).closing().encode();
        let text = std::str::from_utf8(&encoded).unwrap();

        assert!(text.starts_with("ICAP/1.0 200 OK\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains(&format!("Encapsulated: req-hdr=0, null-body={}\r\n\r\n", head.len())));
        assert!(text.ends_with(head));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(IcapStatus::ServiceNotFound.to_string(), "404 ICAP Service Not Found");
        assert_eq!(IcapStatus::VersionNotSupported.code(), 505);
    }
}

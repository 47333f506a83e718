//! Encapsulated HTTP request heads.

use bytes::{BufMut, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Version, header::HOST};

use crate::adapter::AdaptRequest;
use crate::error::IcapError;

const MAX_HEADERS: usize = 128;

/// Parse the `req-hdr` section of a REQMOD message.
pub fn parse_request_head(raw: &[u8]) -> Result<AdaptRequest, IcapError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(raw) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => return Err(IcapError::BadHeader("incomplete HTTP request head".into())),
        Err(e) => return Err(IcapError::BadHeader(format!("HTTP request head: {e}"))),
    }

    let method = Method::from_bytes(req.method.unwrap_or_default().as_bytes())
        .map_err(|e| IcapError::BadHeader(e.to_string()))?;
    let target = req.path.unwrap_or_default().to_string();
    let version = match req.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut map = HeaderMap::with_capacity(req.headers.len());
    for header in req.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|e| IcapError::BadHeader(e.to_string()))?;
        let value = HeaderValue::from_bytes(header.value).map_err(|e| IcapError::BadHeader(e.to_string()))?;
        map.append(name, value);
    }

    let url = absolute_url(&target, &map);

    Ok(AdaptRequest { method, target, version, url, headers: map })
}

/// Absolute URL of a request target.
///
/// Proxies send absolute-form targets. An origin-form target is joined with
/// `Host` under `https`, the scheme every CDN pattern serves.
fn absolute_url(target: &str, headers: &HeaderMap) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }

    match headers.get(HOST).and_then(|h| h.to_str().ok()) {
        Some(host) if target.starts_with('/') => format!("https://{host}{target}"),
        _ => target.to_string(),
    }
}

/// Serialize a request head with the given headers, ending in an empty line.
pub fn encode_request_head(request: &AdaptRequest, headers: &HeaderMap) -> BytesMut {
    let mut buf = BytesMut::with_capacity(256);

    buf.put_slice(request.method.as_str().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(request.target.as_bytes());
    buf.put_slice(match request.version {
        Version::HTTP_10 => b" HTTP/1.0\r\n",
        _ => b" HTTP/1.1\r\n",
    });

    for (name, value) in headers.iter() {
        buf.put_slice(name.as_str().as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(b"\r\n");

    buf
}

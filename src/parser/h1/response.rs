//! HTTP/1.1 response serialization: a handler fills in a [`Response`], and
//! [`Response::write_head`]/chunk helpers turn it (and any streamed body)
//! into wire bytes for `Connection::pump_send`.
//!
//! [`ResponseHead`] is the other direction: parsing a status line and
//! headers back out of the wire, incrementally, for the hybrid HTTPS
//! client processor rather than for any server-side code path.

use super::{find_blank_line, parse_header_line, parse_status_line, strip_cr, ParseError, ParseResult};
use crate::parser::{Header, Status, Version};

/// A response a Level 1/2 handler builds up before the processor sends it.
#[derive(Debug, Clone)]
pub struct Response {
    /// Protocol version to report on the status line.
    pub version: Version,
    /// Status code and reason phrase.
    pub status: Status,
    /// Header fields in the order they should be emitted. `Content-Length`
    /// is added automatically from `body`'s length unless already present.
    pub headers: Vec<Header>,
    /// The full response body. Always buffered in memory; there is no
    /// streaming body API in the core.
    pub body: Vec<u8>,
}

impl Response {
    /// A response with the given status and an empty body.
    pub fn new_with_status(version: Version, status: Status) -> Self {
        Self {
            version,
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Appends a header field.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Sets the body, replacing any previous one.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h.name.eq_ignore_ascii_case(name))
    }

    /// Serializes the status line and headers (not the body) to wire
    /// bytes, adding `Content-Length` when it is not already set.
    pub fn write_head(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.headers.len() * 32);
        out.extend_from_slice(self.version.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.status.code().to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.status.reason_phrase().as_bytes());
        out.extend_from_slice(b"\r\n");

        for header in &self.headers {
            out.extend_from_slice(header.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(header.value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        if !self.has_header("content-length") && !self.has_header("transfer-encoding") {
            out.extend_from_slice(b"Content-Length: ");
            out.extend_from_slice(self.body.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Serializes the full response (head + body) in one buffer.
    pub fn write_full(&self) -> Vec<u8> {
        let mut out = self.write_head();
        out.extend_from_slice(&self.body);
        out
    }
}

/// A parsed status line and header block, read incrementally off the wire
/// the same way [`super::request::Request`] reads a request head.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// Reported protocol version.
    pub version: Version,
    /// Status code and reason phrase.
    pub status: Status,
    /// Header fields in wire order.
    pub headers: Vec<Header>,
}

impl ResponseHead {
    /// Case-insensitive header lookup, returning the first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Parses the `Content-Length` header, if present and well-formed.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.parse().ok())
    }

    /// Whether the body uses chunked transfer-coding (RFC 9112 §7.1); only
    /// the final coding in the list governs framing.
    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .map(|v| v.rsplit(',').next().is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked")))
            .unwrap_or(false)
    }

    /// Attempts to parse a complete status line and header block from the
    /// front of `buf`. Same "ask for more data" contract as
    /// [`super::request::Request::parse`].
    pub fn parse(buf: &[u8]) -> ParseResult<Option<(ResponseHead, usize)>> {
        let Some(head_end) = find_blank_line(buf) else {
            return Ok(None);
        };

        let mut lines = buf[..head_end].split(|&b| b == b'\n').map(strip_cr);
        let status_line = lines.next().ok_or(ParseError::NewLine)?;
        let (version, status) = parse_status_line(status_line)?;

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            headers.push(parse_header_line(line)?);
        }

        Ok(Some((ResponseHead { version, status, headers }, head_end)))
    }
}

/// Wraps `data` as one chunk of a chunked-encoded body (RFC 9112 §7.1.1).
pub fn encode_chunk(data: &[u8]) -> Vec<u8> {
    let mut out = format!("{:x}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

/// The terminating zero-length chunk plus trailer-less final CRLF.
pub fn final_chunk() -> Vec<u8> {
    b"0\r\n\r\n".to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_head_includes_content_length_by_default() {
        let resp = Response::new_with_status(Version::H1_1, Status::r#Ok).with_body(*b"OK");
        let head = resp.write_head();
        let head = String::from_utf8(head).unwrap();
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Length: 2\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn write_full_appends_body_after_head() {
        let resp = Response::new_with_status(Version::H1_1, Status::r#Ok).with_body(*b"OK");
        let full = resp.write_full();
        assert!(full.ends_with(b"\r\n\r\nOK"));
    }

    #[test]
    fn explicit_content_length_header_is_not_duplicated() {
        let resp = Response::new_with_status(Version::H1_1, Status::NoContent)
            .header("Content-Length", "0");
        let head = String::from_utf8(resp.write_head()).unwrap();
        assert_eq!(head.matches("Content-Length").count(), 1);
    }

    #[test]
    fn chunk_encoding_uses_hex_length_prefix() {
        assert_eq!(encode_chunk(b"abc"), b"3\r\nabc\r\n");
        assert_eq!(final_chunk(), b"0\r\n\r\n");
    }

    #[test]
    fn response_head_parses_status_and_headers() {
        let (head, consumed) = ResponseHead::parse(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK")
            .unwrap()
            .unwrap();
        assert_eq!(head.version, Version::H1_1);
        assert_eq!(head.status.code(), 200);
        assert_eq!(head.content_length(), Some(2));
        assert_eq!(consumed, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n".len());
    }

    #[test]
    fn response_head_incomplete_asks_for_more_data() {
        assert!(matches!(ResponseHead::parse(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n"), Ok(None)));
    }

    #[test]
    fn response_head_detects_chunked_encoding() {
        let (head, _) = ResponseHead::parse(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")
            .unwrap()
            .unwrap();
        assert!(head.is_chunked());
    }
}

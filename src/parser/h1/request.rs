// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP/1.1 request line + headers (IETF RFC 9112), parsed incrementally
//! against whatever prefix of the wire has arrived so far.

use super::{find_blank_line, is_target_token, parse_header_line, strip_cr, ParseError, ParseResult};
use crate::parser::{Header, Method, Version};

/// Maximum size, in bytes, of the request line plus headers this parser
/// will scan before giving up and reporting [`ParseError::TooLarge`]. The
/// http1 processor additionally enforces the connection's overall recv
/// buffer cap; this bound exists so a client that never sends a blank line
/// doesn't force a full buffer scan on every byte received.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// A fully parsed request line and header block, plus the request body
/// once it has finished arriving. [`Request::parse`] only knows about the
/// head, so it always returns an empty `body`; the http1 and HTTP/2
/// processors fill it in (from `Content-Length`/chunked framing, or from
/// accumulated DATA frames, respectively) before handing the request to a
/// [`crate::handler::Handler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Request target, exactly as received (origin-form path+query for
    /// ordinary requests, `authority` for CONNECT).
    pub target: String,
    /// Declared protocol version.
    pub version: Version,
    /// Header fields in wire order.
    pub headers: Vec<Header>,
    /// The request body, fully assembled. Empty until the processor that
    /// owns body framing fills it in.
    pub body: Vec<u8>,
}

impl Request {
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

    /// Whether the body uses chunked transfer-coding (RFC 9112 §7.1). Per
    /// RFC 9112 §6.1, only the last coding in the list governs framing;
    /// this server recognizes exactly `chunked` as that final coding.
    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .map(|v| {
                v.rsplit(',')
                    .next()
                    .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
            })
            .unwrap_or(false)
    }

    /// Whether the client asked to keep the connection open once this
    /// message completes. HTTP/1.1 defaults to persistent; HTTP/1.0
    /// defaults to non-persistent (RFC 9112 §9.3).
    pub fn keep_alive(&self) -> bool {
        match self.header("connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version == Version::H1_1,
        }
    }

    /// Attempts to parse a complete request line and header block from the
    /// front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not yet contain a terminating
    /// blank line — the caller should wait for more bytes and retry.
    /// Returns `Ok(Some((request, consumed)))` once a full head has been
    /// parsed, where `consumed` is the number of bytes (through the blank
    /// line) the caller should drop from its buffer.
    ///
    /// # Example
    /// ```
    /// # use polynet::parser::h1::request::Request;
    /// # use polynet::parser::{Method, Version};
    /// let (req, consumed) = Request::parse(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
    ///     .unwrap()
    ///     .unwrap();
    /// assert_eq!(req.method, Method::Get);
    /// assert_eq!(req.target, "/");
    /// assert_eq!(req.version, Version::H1_1);
    /// assert_eq!(consumed, 28);
    /// ```
    pub fn parse(buf: &[u8]) -> ParseResult<Option<(Request, usize)>> {
        let Some(head_end) = find_blank_line(buf) else {
            if buf.len() > MAX_HEAD_SIZE {
                return Err(ParseError::TooLarge);
            }
            return Ok(None);
        };
        if head_end > MAX_HEAD_SIZE {
            return Err(ParseError::TooLarge);
        }

        let mut lines = buf[..head_end].split(|&b| b == b'\n').map(strip_cr);
        let request_line = lines.next().ok_or(ParseError::NewLine)?;
        let (method, target, version) = parse_request_line(request_line)?;

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            headers.push(parse_header_line(line)?);
        }

        Ok(Some((
            Request {
                method,
                target,
                version,
                headers,
                body: Vec::new(),
            },
            head_end,
        )))
    }
}

fn parse_request_line(line: &[u8]) -> ParseResult<(Method, String, Version)> {
    let mut parts = line.splitn(3, |&b| b == b' ');
    let method_bytes = parts.next().filter(|s| !s.is_empty()).ok_or(ParseError::Method)?;
    let target_bytes = parts.next().filter(|s| !s.is_empty()).ok_or(ParseError::Target)?;
    let version_bytes = parts.next().ok_or(ParseError::Version)?;

    let method = Method::from_bytes(method_bytes).ok_or(ParseError::Method)?;

    if !target_bytes.iter().all(|&b| is_target_token(b)) {
        return Err(ParseError::Target);
    }
    // SAFETY: every byte passed `is_target_token`, which only admits the
    // visible-ASCII range and is therefore valid UTF-8.
    let target = unsafe { std::str::from_utf8_unchecked(target_bytes) }.to_string();

    let version = parse_version(version_bytes)?;

    Ok((method, target, version))
}

fn parse_version(bytes: &[u8]) -> ParseResult<Version> {
    match bytes {
        b"HTTP/1.0" => Ok(Version::H1_0),
        b"HTTP/1.1" => Ok(Version::H1_1),
        b"HTTP/2.0" | b"HTTP/2" => Ok(Version::H2),
        _ => Err(ParseError::Version),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_get() {
        let (req, consumed) = Request::parse(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.target, "/hello");
        assert_eq!(req.version, Version::H1_1);
        assert_eq!(req.header("host"), Some("x"));
        assert_eq!(consumed, b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n".len());
    }

    #[test]
    fn incomplete_head_asks_for_more_data() {
        assert_eq!(Request::parse(b"GET /hello HTTP/1.1\r\nHost: x\r\n"), Ok(None));
    }

    #[test]
    fn rejects_unknown_method() {
        assert_eq!(
            Request::parse(b"FLY /x HTTP/1.1\r\n\r\n"),
            Err(ParseError::Method)
        );
    }

    #[test]
    fn rejects_bad_version() {
        assert_eq!(
            Request::parse(b"GET /x HTTP/9.9\r\n\r\n"),
            Err(ParseError::Version)
        );
    }

    #[test]
    fn content_length_is_parsed_from_headers() {
        let (req, _) = Request::parse(b"POST /x HTTP/1.1\r\nContent-Length: 42\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(req.content_length(), Some(42));
    }

    #[test]
    fn chunked_transfer_encoding_is_detected() {
        let (req, _) = Request::parse(b"POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n")
            .unwrap()
            .unwrap();
        assert!(req.is_chunked());
    }

    #[test]
    fn http_1_0_defaults_to_non_persistent() {
        let (req, _) = Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap().unwrap();
        assert!(!req.keep_alive());
    }

    #[test]
    fn connection_close_overrides_http_1_1_default() {
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
            .unwrap()
            .unwrap();
        assert!(!req.keep_alive());
    }

    #[test]
    fn oversized_head_without_terminator_is_rejected() {
        let mut buf = b"GET / HTTP/1.1\r\n".to_vec();
        buf.extend(std::iter::repeat(b'a').take(MAX_HEAD_SIZE + 1));
        assert_eq!(Request::parse(&buf), Err(ParseError::TooLarge));
    }
}

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

//! HTTP/1.1 request/response framing (RFC 7230/9112), grounded on the
//! teacher's original `H1Request` shape but made incremental: a connection
//! may hand a processor an arbitrary prefix of the wire bytes, so parsing
//! has to say "need more data" rather than assume the whole message is
//! already in hand.

use core::fmt::Display;

pub mod request;
pub mod response;

/// Represents possible failures while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Invalid byte in method.
    Method,
    /// Invalid byte in target.
    Target,
    /// Invalid HTTP version.
    Version,
    /// Invalid byte in header name.
    HeaderName,
    /// Invalid byte in header value.
    HeaderValue,
    /// Invalid or missing new line.
    NewLine,
    /// Request line or headers exceeded the configured size bound.
    TooLarge,
}

impl ParseError {
    fn description_str(&self) -> &'static str {
        match *self {
            ParseError::Method => "invalid token in method",
            ParseError::Target => "invalid token in target",
            ParseError::Version => "invalid version",
            ParseError::HeaderName => "invalid token in header name",
            ParseError::HeaderValue => "invalid token in header value",
            ParseError::NewLine => "invalid or missing new line",
            ParseError::TooLarge => "request head exceeded size limit",
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description_str())
    }
}

impl std::error::Error for ParseError {}

/// Result whose Err variant is `ParseError`.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// A byte is valid in a `request-target` per RFC 9112 §3.2 (origin-form and
/// friends): visible ASCII minus the space that terminates the token.
#[inline]
fn is_target_token(b: u8) -> bool {
    (0x21..=0x7e).contains(&b)
}

/// A byte is a `tchar` per RFC 9110 §5.6.2, valid in a header field name.
#[inline]
fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

/// A byte is valid in a header field value per RFC 9110 §5.5: visible
/// ASCII, space, and horizontal tab.
#[inline]
fn is_field_value_token(b: u8) -> bool {
    b == b'\t' || (0x20..=0x7e).contains(&b)
}

/// Strips a trailing `\r` from a line already split on `\n`. Shared by the
/// request and response head parsers.
pub(super) fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Finds the byte offset just past the blank line (`\r\n\r\n` or a bare
/// `\n\n`, tolerated the way most production parsers do) that terminates a
/// head block, if `buf` contains one. Shared by the request and response
/// head parsers.
pub(super) fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
        .or_else(|| buf.windows(2).position(|w| w == b"\n\n").map(|i| i + 2))
}

/// Parses a response status line (`HTTP/1.1 200 OK`) into its version and
/// status code.
pub(super) fn parse_status_line(line: &[u8]) -> ParseResult<(crate::parser::Version, crate::parser::Status)> {
    let mut parts = line.splitn(3, |&b| b == b' ');
    let version_bytes = parts.next().filter(|s| !s.is_empty()).ok_or(ParseError::Version)?;
    let code_bytes = parts.next().filter(|s| !s.is_empty()).ok_or(ParseError::Target)?;

    let version = match version_bytes {
        b"HTTP/1.0" => crate::parser::Version::H1_0,
        b"HTTP/1.1" => crate::parser::Version::H1_1,
        _ => return Err(ParseError::Version),
    };
    let code_str = std::str::from_utf8(code_bytes).map_err(|_| ParseError::Target)?;
    let code: u16 = code_str.parse().map_err(|_| ParseError::Target)?;
    let status = crate::parser::Status::from_code(code).ok_or(ParseError::Target)?;
    Ok((version, status))
}

/// Parses one header line (`Name: value`) shared by request and response
/// head parsers.
pub(super) fn parse_header_line(line: &[u8]) -> ParseResult<crate::parser::Header> {
    let colon = line.iter().position(|&b| b == b':').ok_or(ParseError::HeaderName)?;
    let (name_bytes, rest) = line.split_at(colon);
    let value_bytes = &rest[1..];

    if name_bytes.is_empty() || !name_bytes.iter().all(|&b| is_tchar(b)) {
        return Err(ParseError::HeaderName);
    }
    let trimmed_value = trim_ows(value_bytes);
    if !trimmed_value.iter().all(|&b| is_field_value_token(b)) {
        return Err(ParseError::HeaderValue);
    }

    // SAFETY: tchar and the field-value token set are both subsets of
    // ASCII, which is always valid UTF-8.
    let name = unsafe { std::str::from_utf8_unchecked(name_bytes) }.to_string();
    let value = unsafe { std::str::from_utf8_unchecked(trimmed_value) }.to_string();
    Ok(crate::parser::Header { name, value })
}

fn trim_ows(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != b' ' && b != b'\t').unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| b != b' ' && b != b'\t').map_or(start, |i| i + 1);
    &bytes[start..end]
}

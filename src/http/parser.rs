//! Request-head parser.
//!
//! Parses the request line and header block out of a byte buffer. The body is
//! never touched here; [`crate::http::request::Request`] reads it lazily
//! against the Content-Length header.

use crate::http::headers::HeaderMap;
use crate::http::request::Method;
use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// The head terminator (`\r\n\r\n`) has not arrived yet.
    Incomplete,
    /// The request line does not match `METHOD SP target SP VERSION`.
    MalformedRequestLine,
    /// A header line does not match `Name: Value`.
    MalformedHeader,
    /// The head is not valid UTF-8.
    InvalidEncoding,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Incomplete => write!(f, "incomplete request head"),
            ParseError::MalformedRequestLine => write!(f, "malformed request line"),
            ParseError::MalformedHeader => write!(f, "malformed header line"),
            ParseError::InvalidEncoding => write!(f, "request head is not valid UTF-8"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parsed request line and headers.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub target: String,
    pub version: String,
    pub headers: HeaderMap,
}

/// Parses a request head from `buf`.
///
/// `buf` must contain the complete head; returns [`ParseError::Incomplete`]
/// until the blank-line terminator is present. On success returns the head
/// and the number of bytes consumed (terminator included), leaving any body
/// bytes unconsumed.
pub fn parse_request_head(buf: &[u8]) -> Result<(RequestHead, usize), ParseError> {
    let head_end = find_head_end(buf).ok_or(ParseError::Incomplete)?;
    let head_bytes = &buf[..head_end];

    let head_str = std::str::from_utf8(head_bytes).map_err(|_| ParseError::InvalidEncoding)?;

    let mut lines = head_str.split("\r\n");

    let request_line = lines.next().ok_or(ParseError::MalformedRequestLine)?;
    let (method, target, version) = parse_request_line(request_line)?;

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (name, value) = line.split_once(':').ok_or(ParseError::MalformedHeader)?;

        // Field names must be a single token; whitespace before the colon is
        // a smuggling vector (RFC 7230 section 3.2.4).
        if name.is_empty() || name.contains(|c: char| c.is_ascii_whitespace()) {
            return Err(ParseError::MalformedHeader);
        }

        headers.insert(name, value.trim().to_string());
    }

    Ok((
        RequestHead {
            method,
            target: target.to_string(),
            version: version.to_string(),
            headers,
        },
        head_end + 4,
    ))
}

fn parse_request_line(line: &str) -> Result<(Method, &str, &str), ParseError> {
    let mut parts = line.split(' ');

    let method_str = parts.next().ok_or(ParseError::MalformedRequestLine)?;
    let target = parts.next().ok_or(ParseError::MalformedRequestLine)?;
    let version = parts.next().ok_or(ParseError::MalformedRequestLine)?;

    if parts.next().is_some()
        || method_str.is_empty()
        || target.is_empty()
        || !version.starts_with("HTTP/")
    {
        return Err(ParseError::MalformedRequestLine);
    }

    Ok((Method::parse(method_str), target, version))
}

/// Position of the `\r\n\r\n` head terminator, if present.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (head, consumed) = parse_request_head(raw).unwrap();

        assert_eq!(head.method, Method::Get);
        assert_eq!(head.target, "/index.html");
        assert_eq!(head.headers.get("Host"), Some("example.com"));
        assert_eq!(consumed, raw.len());
    }

    #[test]
    fn body_bytes_are_not_consumed() {
        let raw = b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";

        let (_, consumed) = parse_request_head(raw).unwrap();

        assert_eq!(&raw[consumed..], b"hello");
    }
}

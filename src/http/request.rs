//! Inbound side of a connection.
//!
//! A [`Request`] owns the read half of an accepted connection. Headers are
//! read and parsed eagerly by [`Request::read_headers`]; the body is read
//! lazily by [`Request::read_body`] against the declared Content-Length.

use crate::http::fields::header;
use crate::http::headers::HeaderMap;
use crate::http::parser::{self, ParseError};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

/// Default cap on the request head, matching the response-header bound used
/// for upstream reads.
pub const DEFAULT_MAX_HEAD_BYTES: usize = 64 * 1024;

/// HTTP request method.
///
/// Unknown verbs are carried as [`Method::Other`]; a token that fits the
/// request-line grammar is not a parse error, it is just a method this
/// server has no special knowledge of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Other(String),
}

impl Method {
    /// Parses a method token. Method names are case-sensitive.
    pub fn parse(s: &str) -> Self {
        match s {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Other(s) => s,
        }
    }

    /// True for methods that read a resource without modifying it.
    pub fn is_read_method(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures while reading the inbound message.
#[derive(Debug)]
pub enum RequestError {
    /// Request line does not match `METHOD SP target SP VERSION`, or the
    /// target cannot be resolved against the server root.
    MalformedRequestLine,
    /// A header line does not match `Name: Value`.
    MalformedHeader,
    /// The head is not valid UTF-8.
    InvalidEncoding,
    /// The stream closed before the head terminator arrived.
    IncompleteHeaders,
    /// The head exceeded the configured size bound.
    HeadersTooLarge,
    /// Content-Length is present but not a valid length.
    InvalidContentLength,
    /// The stream closed before the declared body length was read.
    TruncatedBody { expected: usize, read: usize },
    /// `read_body` was called before `read_headers` completed.
    HeadersNotRead,
    Io(io::Error),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::MalformedRequestLine => write!(f, "malformed request line"),
            RequestError::MalformedHeader => write!(f, "malformed header line"),
            RequestError::InvalidEncoding => write!(f, "request head is not valid UTF-8"),
            RequestError::IncompleteHeaders => {
                write!(f, "connection closed before the header terminator")
            }
            RequestError::HeadersTooLarge => write!(f, "request head too large"),
            RequestError::InvalidContentLength => write!(f, "invalid Content-Length header"),
            RequestError::TruncatedBody { expected, read } => {
                write!(f, "body truncated: declared {expected} bytes, read {read}")
            }
            RequestError::HeadersNotRead => {
                write!(f, "body requested before headers were read")
            }
            RequestError::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RequestError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RequestError {
    fn from(e: io::Error) -> Self {
        RequestError::Io(e)
    }
}

impl From<ParseError> for RequestError {
    fn from(e: ParseError) -> Self {
        match e {
            // Incomplete only escapes the read loop at end-of-stream.
            ParseError::Incomplete => RequestError::IncompleteHeaders,
            ParseError::MalformedRequestLine => RequestError::MalformedRequestLine,
            ParseError::MalformedHeader => RequestError::MalformedHeader,
            ParseError::InvalidEncoding => RequestError::InvalidEncoding,
        }
    }
}

/// Callback invoked with the parsed headers as soon as they are available.
pub type HeadersCallback = Arc<dyn Fn(&HeaderMap) + Send + Sync>;

/// A parsed (or still-unparsed) inbound HTTP request.
///
/// Method, headers and URL are empty until [`read_headers`](Self::read_headers)
/// completes.
pub struct Request {
    input: Option<Box<dyn AsyncRead + Send + Unpin>>,
    buffer: BytesMut,
    root_url: Url,
    max_head_bytes: usize,
    did_read_headers: bool,
    method: Option<Method>,
    target: Option<String>,
    version: Option<String>,
    headers: HeaderMap,
    url: Option<Url>,
    request_time: Option<Instant>,
    body: Option<Bytes>,
    on_headers: Option<HeadersCallback>,
}

impl Request {
    /// Wraps the read half of an accepted connection. `root_url` is the
    /// server root used to resolve origin-form request targets.
    pub fn new(input: Box<dyn AsyncRead + Send + Unpin>, root_url: Url) -> Self {
        Self {
            input: Some(input),
            buffer: BytesMut::with_capacity(4096),
            root_url,
            max_head_bytes: DEFAULT_MAX_HEAD_BYTES,
            did_read_headers: false,
            method: None,
            target: None,
            version: None,
            headers: HeaderMap::new(),
            url: None,
            request_time: None,
            body: None,
            on_headers: None,
        }
    }

    pub fn set_max_head_bytes(&mut self, limit: usize) {
        self.max_head_bytes = limit;
    }

    /// Registers a callback fired with the header map once parsing succeeds.
    pub fn set_headers_callback(&mut self, callback: impl Fn(&HeaderMap) + Send + Sync + 'static) {
        self.on_headers = Some(Arc::new(callback));
    }

    pub fn did_read_headers(&self) -> bool {
        self.did_read_headers
    }

    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    /// Raw request-target as it appeared on the request line.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request target resolved against the server root.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Arrival time of the first byte.
    pub fn request_time(&self) -> Option<Instant> {
        self.request_time
    }

    /// Reads from the input stream until the blank-line terminator, then
    /// parses the request line and headers.
    pub async fn read_headers(&mut self) -> Result<(), RequestError> {
        if self.did_read_headers {
            return Ok(());
        }

        loop {
            match parser::parse_request_head(&self.buffer) {
                Ok((head, consumed)) => {
                    let _ = self.buffer.split_to(consumed);
                    self.url = Some(
                        resolve_target(&self.root_url, &head.target)
                            .ok_or(RequestError::MalformedRequestLine)?,
                    );
                    self.method = Some(head.method);
                    self.target = Some(head.target);
                    self.version = Some(head.version);
                    self.headers = head.headers;
                    self.did_read_headers = true;

                    if let Some(callback) = &self.on_headers {
                        callback(&self.headers);
                    }
                    return Ok(());
                }
                Err(ParseError::Incomplete) => {
                    if self.buffer.len() > self.max_head_bytes {
                        return Err(RequestError::HeadersTooLarge);
                    }
                }
                Err(e) => return Err(e.into()),
            }

            let Some(input) = self.input.as_mut() else {
                return Err(RequestError::IncompleteHeaders);
            };
            let n = input.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(RequestError::IncompleteHeaders);
            }
            if self.request_time.is_none() {
                self.request_time = Some(Instant::now());
            }
        }
    }

    /// Returns the message body.
    ///
    /// Reads exactly Content-Length bytes; a stream that closes short yields
    /// [`RequestError::TruncatedBody`]. Without Content-Length the body is
    /// empty. The result is cached, so repeated calls return the same bytes
    /// without disturbing the stream position.
    pub async fn read_body(&mut self) -> Result<Bytes, RequestError> {
        if !self.did_read_headers {
            return Err(RequestError::HeadersNotRead);
        }
        if let Some(body) = &self.body {
            return Ok(body.clone());
        }

        let expected = match self.headers.get(header::CONTENT_LENGTH) {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|_| RequestError::InvalidContentLength)?,
            None => 0,
        };

        while self.buffer.len() < expected {
            let read = self.buffer.len();
            let Some(input) = self.input.as_mut() else {
                return Err(RequestError::TruncatedBody { expected, read });
            };
            let n = input.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(RequestError::TruncatedBody {
                    expected,
                    read: self.buffer.len(),
                });
            }
        }

        let body = self.buffer.split_to(expected).freeze();
        self.body = Some(body.clone());
        Ok(body)
    }

    /// Closes the input stream. Idempotent, and safe to call even if the
    /// headers were never fully read.
    pub fn complete_request(&mut self) {
        self.input = None;
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("did_read_headers", &self.did_read_headers)
            .field("method", &self.method)
            .field("target", &self.target)
            .field("headers", &self.headers.len())
            .finish()
    }
}

fn resolve_target(root: &Url, target: &str) -> Option<Url> {
    if target == "*" {
        return Some(root.clone());
    }
    if target.starts_with('/') {
        return root.join(target).ok();
    }
    // Absolute-form target, e.g. proxied requests.
    Url::parse(target).ok()
}

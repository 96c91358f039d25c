//! Static-file handler.
//!
//! A prototype is bound to a filesystem path: a single file, or a directory
//! to resolve request paths under. The per-request clone carries the
//! resolved path, so concurrent requests never share resolution state.

use crate::handler::{Handler, HandlerFuture};
use crate::http::fields::{header, status};
use crate::http::mime;
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct FileHandler {
    root: PathBuf,
    // Per-request binding, set only on clones made by for_request.
    resolved: Option<PathBuf>,
}

impl FileHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            resolved: None,
        }
    }

    /// Maps the request target to a path under the bound root.
    ///
    /// A root that is itself a file answers every matched request with that
    /// file. Directory roots resolve the URL path segment by segment; `..`
    /// segments are rejected outright so a request can never escape the root.
    fn resolve(&self, request: &Request) -> Option<PathBuf> {
        let url = request.url()?;
        let meta = std::fs::metadata(&self.root).ok()?;
        if meta.is_file() {
            return Some(self.root.clone());
        }

        let mut path = self.root.clone();
        for segment in url.path_segments()? {
            match segment {
                "" | "." => continue,
                ".." => return None,
                segment => path.push(segment),
            }
        }
        if path.is_dir() {
            path.push("index.html");
        }
        Some(path)
    }
}

impl Handler for FileHandler {
    fn can_handle(&self, request: &Request) -> bool {
        let readable = request.method().is_some_and(Method::is_read_method);
        readable && self.resolve(request).is_some_and(|p| p.exists())
    }

    fn for_request(&self, request: &Request) -> Box<dyn Handler> {
        Box::new(Self {
            root: self.root.clone(),
            resolved: self.resolve(request),
        })
    }

    fn handle<'a>(
        &'a mut self,
        request: &'a mut Request,
        response: &'a mut Response,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let Some(path) = self.resolved.clone() else {
                return response
                    .send_simple(status::NOT_FOUND, "text/plain", b"404 Not Found")
                    .await;
            };

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => return send_fs_error(response, &e).await,
            };

            let content_type = mime::content_type_for(&path);
            let head_only = request.method() == Some(&Method::Head);

            let range = request
                .headers()
                .get(header::RANGE)
                .map(|value| parse_range(value, bytes.len()));

            match range {
                Some(ByteRange::Partial(start, end)) => {
                    let slice = &bytes[start..=end];
                    let _ = response.send_status(status::PARTIAL_CONTENT).await;
                    let headers = vec![
                        (header::CONTENT_TYPE.to_string(), content_type.to_string()),
                        (header::CONTENT_LENGTH.to_string(), slice.len().to_string()),
                        (
                            header::CONTENT_RANGE.to_string(),
                            format!("bytes {start}-{end}/{}", bytes.len()),
                        ),
                        (header::ACCEPT_RANGES.to_string(), "bytes".to_string()),
                    ];
                    let _ = response.send_headers(&headers).await;
                    if !head_only {
                        let _ = response.send_body(slice).await;
                    }
                    status::PARTIAL_CONTENT
                }
                Some(ByteRange::Unsatisfiable) => {
                    let _ = response.send_status(status::RANGE_NOT_SATISFIABLE).await;
                    let headers = vec![
                        (
                            header::CONTENT_RANGE.to_string(),
                            format!("bytes */{}", bytes.len()),
                        ),
                        (header::CONTENT_LENGTH.to_string(), "0".to_string()),
                    ];
                    let _ = response.send_headers(&headers).await;
                    status::RANGE_NOT_SATISFIABLE
                }
                _ => {
                    let _ = response.send_status(status::OK).await;
                    let headers = vec![
                        (header::CONTENT_TYPE.to_string(), content_type.to_string()),
                        (header::CONTENT_LENGTH.to_string(), bytes.len().to_string()),
                        (header::ACCEPT_RANGES.to_string(), "bytes".to_string()),
                    ];
                    let _ = response.send_headers(&headers).await;
                    if !head_only {
                        let _ = response.send_body(&bytes).await;
                    }
                    status::OK
                }
            }
        })
    }
}

async fn send_fs_error(response: &mut Response, error: &std::io::Error) -> u16 {
    match error.kind() {
        ErrorKind::NotFound => {
            response
                .send_simple(status::NOT_FOUND, "text/plain", b"404 Not Found")
                .await
        }
        ErrorKind::PermissionDenied => {
            response
                .send_simple(status::FORBIDDEN, "text/plain", b"403 Forbidden")
                .await
        }
        _ => {
            response
                .send_simple(
                    status::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    b"500 Internal Server Error",
                )
                .await
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    /// No usable range; serve the whole file. Malformed range headers are
    /// ignored rather than rejected (RFC 7233 section 3.1).
    Full,
    /// Inclusive byte range within the file.
    Partial(usize, usize),
    Unsatisfiable,
}

/// Parses a single `bytes=` range against a file of `len` bytes. Multi-range
/// requests are served whole rather than as multipart.
fn parse_range(value: &str, len: usize) -> ByteRange {
    let Some(spec) = value.strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if spec.contains(',') {
        return ByteRange::Full;
    }
    let Some((start_str, end_str)) = spec.split_once('-') else {
        return ByteRange::Full;
    };

    if start_str.is_empty() {
        // Suffix form: last N bytes.
        return match end_str.trim().parse::<usize>() {
            Ok(0) => ByteRange::Unsatisfiable,
            Ok(_) if len == 0 => ByteRange::Unsatisfiable,
            Ok(n) => {
                let n = n.min(len);
                ByteRange::Partial(len - n, len - 1)
            }
            Err(_) => ByteRange::Full,
        };
    }

    let start = match start_str.trim().parse::<usize>() {
        Ok(start) => start,
        Err(_) => return ByteRange::Full,
    };
    if start >= len {
        return ByteRange::Unsatisfiable;
    }

    let end = if end_str.is_empty() {
        len - 1
    } else {
        match end_str.trim().parse::<usize>() {
            Ok(end) => end.min(len - 1),
            Err(_) => return ByteRange::Full,
        }
    };

    if end < start {
        return ByteRange::Unsatisfiable;
    }
    ByteRange::Partial(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_forms() {
        assert_eq!(parse_range("bytes=0-4", 10), ByteRange::Partial(0, 4));
        assert_eq!(parse_range("bytes=5-", 10), ByteRange::Partial(5, 9));
        assert_eq!(parse_range("bytes=-3", 10), ByteRange::Partial(7, 9));
        assert_eq!(parse_range("bytes=2-100", 10), ByteRange::Partial(2, 9));
    }

    #[test]
    fn unsatisfiable_and_malformed_ranges() {
        assert_eq!(parse_range("bytes=10-", 10), ByteRange::Unsatisfiable);
        assert_eq!(parse_range("bytes=-0", 10), ByteRange::Unsatisfiable);
        assert_eq!(parse_range("bytes=4-2", 10), ByteRange::Unsatisfiable);
        assert_eq!(parse_range("items=0-4", 10), ByteRange::Full);
        assert_eq!(parse_range("bytes=a-b", 10), ByteRange::Full);
        assert_eq!(parse_range("bytes=0-1,3-4", 10), ByteRange::Full);
    }
}

//! HTTP/1.1 protocol layer.
//!
//! One [`request::Request`]/[`response::Response`] pair is created per
//! accepted connection, each owning one half of the stream:
//!
//! - **`fields`**: catalog of status codes, reason phrases and header names
//! - **`headers`**: case-insensitive header map
//! - **`parser`**: request-line and header-block grammar
//! - **`request`**: inbound stream; eager header read, lazy body read
//! - **`response`**: outbound stream; status/headers/body writer with
//!   fire-and-record error handling
//! - **`mime`**: content-type detection for the file handler
//!
//! Framing is fixed-length only (Content-Length); chunked transfer-coding,
//! TLS and HTTP/2 are out of scope.

pub mod fields;
pub mod headers;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;

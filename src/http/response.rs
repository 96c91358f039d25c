//! Outbound side of a connection.
//!
//! A [`Response`] owns the write half of an accepted connection and
//! serializes the status line, header block and body in that order. Write
//! failures are recorded into [`Response::output_error`] rather than
//! unwinding the caller, so handler code can run to completion and the
//! server can still tear the connection down cleanly.

use crate::http::fields::{self, header};
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Callback fired exactly once when the response completes.
pub type CompletionCallback = Arc<dyn Fn(&Response) + Send + Sync>;

pub struct Response {
    output: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    status: u16,
    did_send_headers: bool,
    headers: Option<Vec<(String, String)>>,
    output_error: Option<io::Error>,
    bytes_sent: usize,
    completed: bool,
    on_complete: Option<CompletionCallback>,
}

impl Response {
    /// Wraps the write half of an accepted connection.
    pub fn new(output: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            output: Some(output),
            status: 0,
            did_send_headers: false,
            headers: None,
            output_error: None,
            bytes_sent: 0,
            completed: false,
            on_complete: None,
        }
    }

    /// Registers the completion callback. Fired exactly once, from
    /// [`complete_response`](Self::complete_response).
    pub fn set_completion_callback(
        &mut self,
        callback: impl Fn(&Response) + Send + Sync + 'static,
    ) {
        self.on_complete = Some(Arc::new(callback));
    }

    /// Status code sent to the client, 0 until [`send_status`](Self::send_status).
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn did_send_headers(&self) -> bool {
        self.did_send_headers
    }

    /// The exact header pairs transmitted, in wire order. `None` until
    /// headers are sent.
    pub fn headers(&self) -> Option<&[(String, String)]> {
        self.headers.as_deref()
    }

    /// First write failure encountered, if any.
    pub fn output_error(&self) -> Option<&io::Error> {
        self.output_error.as_ref()
    }

    /// Total bytes handed to the output stream.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Writes the status line `HTTP/1.1 <code> <reason>`.
    ///
    /// Must be the first send on the response; the result may be ignored
    /// (the failure stays recorded in [`output_error`](Self::output_error)).
    pub async fn send_status(&mut self, code: u16) -> io::Result<()> {
        if self.completed {
            return Err(self.guard("send_status after completion"));
        }
        if self.status != 0 {
            return Err(self.guard("status line already sent"));
        }
        self.status = code;
        let line = format!("{HTTP_VERSION} {code} {}\r\n", fields::reason_phrase(code));
        self.write_all(line.as_bytes()).await
    }

    /// Writes the header block followed by the blank terminator line, in the
    /// caller's order. Requires a sent status line.
    pub async fn send_headers(&mut self, headers: &[(String, String)]) -> io::Result<()> {
        if self.completed {
            return Err(self.guard("send_headers after completion"));
        }
        if self.status == 0 {
            return Err(self.guard("send_headers before send_status"));
        }
        if self.did_send_headers {
            return Err(self.guard("headers already sent"));
        }
        self.did_send_headers = true;
        self.headers = Some(headers.to_vec());

        let mut block = String::new();
        for (name, value) in headers {
            block.push_str(name);
            block.push_str(": ");
            block.push_str(value);
            block.push_str("\r\n");
        }
        block.push_str("\r\n");
        self.write_all(block.as_bytes()).await
    }

    /// Writes raw body bytes. Valid only after the header block; multiple
    /// calls concatenate in call order.
    pub async fn send_body(&mut self, data: &[u8]) -> io::Result<()> {
        if self.completed {
            return Err(self.guard("send_body after completion"));
        }
        if !self.did_send_headers {
            return Err(self.guard("send_body before send_headers"));
        }
        self.write_all(data).await
    }

    /// Convenience: status + Content-Type/Content-Length headers + body.
    ///
    /// Failures are recorded, not returned; the status code comes back so
    /// handlers can use it as their advisory return value.
    pub async fn send_simple(&mut self, status: u16, content_type: &str, body: &[u8]) -> u16 {
        let _ = self.send_status(status).await;
        let headers = vec![
            (header::CONTENT_TYPE.to_string(), content_type.to_string()),
            (header::CONTENT_LENGTH.to_string(), body.len().to_string()),
        ];
        let _ = self.send_headers(&headers).await;
        let _ = self.send_body(body).await;
        status
    }

    /// Flushes and closes the output stream, then fires the completion
    /// callback. Idempotent; runs regardless of earlier send failures.
    pub async fn complete_response(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;

        if let Some(mut output) = self.output.take() {
            if let Err(e) = output.shutdown().await {
                if self.output_error.is_none() {
                    self.output_error = Some(e);
                }
            }
        }

        if let Some(callback) = self.on_complete.take() {
            callback(self);
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let Some(output) = self.output.as_mut() else {
            return Err(self.guard("output stream closed"));
        };
        match output.write_all(bytes).await {
            Ok(()) => {
                self.bytes_sent += bytes.len();
                Ok(())
            }
            Err(e) => {
                if self.output_error.is_none() {
                    self.output_error = Some(io::Error::new(e.kind(), e.to_string()));
                }
                Err(e)
            }
        }
    }

    // Sequencing violations are recorded like write failures so a misbehaving
    // handler cannot corrupt the wire format.
    fn guard(&mut self, message: &str) -> io::Error {
        if self.output_error.is_none() {
            self.output_error = Some(io::Error::new(
                io::ErrorKind::InvalidInput,
                message.to_string(),
            ));
        }
        io::Error::new(io::ErrorKind::InvalidInput, message.to_string())
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("did_send_headers", &self.did_send_headers)
            .field("bytes_sent", &self.bytes_sent)
            .field("completed", &self.completed)
            .finish()
    }
}

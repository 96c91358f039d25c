//! Handler prototypes.
//!
//! A handler is registered with the server once, as a stateless *prototype*.
//! On each dispatch the server asks every prototype [`Handler::can_handle`]
//! (most recently registered first); the winner is asked for an independent
//! per-request clone via [`Handler::for_request`], and only the clone runs
//! [`Handler::handle`]. Clones share no mutable state with the prototype or
//! with clones made for other requests, so nothing captured while handling
//! one request can leak into another.

pub mod file;

use crate::http::fields::{header, status};
use crate::http::request::Request;
use crate::http::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by [`Handler::handle`]. The output is the advisory
/// status code: handlers write the response themselves, the return value is
/// for logging only.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = u16> + Send + 'a>>;

/// Predicate deciding whether a prototype claims a request.
pub type RequestPredicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Action producing the response for a claimed request.
pub type ResponseAction =
    Arc<dyn for<'a> Fn(&'a mut Request, &'a mut Response) -> HandlerFuture<'a> + Send + Sync>;

/// A unit of request-matching and response-production.
pub trait Handler: Send + Sync {
    /// Pure predicate; must not mutate shared state. Called concurrently
    /// across prototypes and connections.
    fn can_handle(&self, request: &Request) -> bool;

    /// Returns an independent clone carrying any per-request binding needed
    /// by [`handle`](Self::handle).
    fn for_request(&self, request: &Request) -> Box<dyn Handler>;

    /// Produces the response, performing the status/headers/body sends
    /// itself. Returns the advisory status code.
    fn handle<'a>(
        &'a mut self,
        request: &'a mut Request,
        response: &'a mut Response,
    ) -> HandlerFuture<'a>;
}

/// Predicate-plus-action handler.
///
/// The action is written as a free function or a closure returning a boxed
/// future:
///
/// ```ignore
/// fn pong<'a>(_req: &'a mut Request, res: &'a mut Response) -> HandlerFuture<'a> {
///     Box::pin(async move { res.send_simple(status::OK, "text/plain", b"pong").await })
/// }
///
/// server.register_handler(Arc::new(BlockHandler::new(
///     |req| req.url().is_some_and(|u| u.path() == "/ping"),
///     pong,
/// )));
/// ```
pub struct BlockHandler {
    predicate: Option<RequestPredicate>,
    action: ResponseAction,
}

impl BlockHandler {
    pub fn new<P, A>(predicate: P, action: A) -> Self
    where
        P: Fn(&Request) -> bool + Send + Sync + 'static,
        A: for<'a> Fn(&'a mut Request, &'a mut Response) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        Self {
            predicate: Some(Arc::new(predicate)),
            action: Arc::new(action),
        }
    }

    /// An action-only handler; matches every request.
    pub fn unconditional<A>(action: A) -> Self
    where
        A: for<'a> Fn(&'a mut Request, &'a mut Response) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        Self {
            predicate: None,
            action: Arc::new(action),
        }
    }
}

impl Handler for BlockHandler {
    fn can_handle(&self, request: &Request) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(request),
            None => true,
        }
    }

    fn for_request(&self, _request: &Request) -> Box<dyn Handler> {
        // The closures themselves are immutable; sharing them via Arc keeps
        // the clone independent in every way that matters.
        Box::new(Self {
            predicate: self.predicate.clone(),
            action: Arc::clone(&self.action),
        })
    }

    fn handle<'a>(
        &'a mut self,
        request: &'a mut Request,
        response: &'a mut Response,
    ) -> HandlerFuture<'a> {
        (self.action)(request, response)
    }
}

/// The always-present fallback: claims every request and answers 501.
pub struct NotImplementedHandler;

impl Handler for NotImplementedHandler {
    fn can_handle(&self, _request: &Request) -> bool {
        true
    }

    fn for_request(&self, _request: &Request) -> Box<dyn Handler> {
        Box::new(NotImplementedHandler)
    }

    fn handle<'a>(
        &'a mut self,
        _request: &'a mut Request,
        response: &'a mut Response,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let body = b"501 Not Implemented";
            let _ = response.send_status(status::NOT_IMPLEMENTED).await;
            let headers = vec![
                (header::CONTENT_TYPE.to_string(), "text/plain".to_string()),
                (header::CONTENT_LENGTH.to_string(), body.len().to_string()),
            ];
            let _ = response.send_headers(&headers).await;
            let _ = response.send_body(body).await;
            status::NOT_IMPLEMENTED
        })
    }
}

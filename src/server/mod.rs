//! Server lifecycle and dispatch.
//!
//! [`Server`] owns the listening socket, the ordered handler-prototype list,
//! the in-flight request registry and the start/stop state machine. Each
//! accepted connection gets its own task and an exclusive
//! [`Request`]/[`Response`] pair; the dispatch walk itself is synchronous
//! and lock-free on the hot path (a snapshot of the prototype list is taken
//! per request).

pub mod registry;

use crate::config::ServerConfig;
use crate::handler::{Handler, NotImplementedHandler};
use crate::http::fields::{header, status};
use crate::http::request::{Request, RequestError};
use crate::http::response::Response;
use registry::{InflightRequest, RequestRegistry};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

/// Start/stop state machine: `Idle -> Starting -> Running -> Stopping -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Idle => "idle",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Server-level failures. Per-connection protocol and I/O errors never
/// surface here; they are contained to the connection's task.
#[derive(Debug)]
pub enum ServerError {
    /// `start` called outside Idle.
    InvalidState(ServerState),
    /// Bind or listen failed; the server returned to Idle.
    Bind(io::Error),
    /// Graceful-shutdown drain elapsed; stragglers were force-closed.
    DrainTimeout { aborted: usize },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::InvalidState(state) => {
                write!(f, "operation invalid in state {state}")
            }
            ServerError::Bind(e) => write!(f, "failed to bind listening socket: {e}"),
            ServerError::DrainTimeout { aborted } => {
                write!(f, "shutdown drain timed out; aborted {aborted} connection(s)")
            }
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind(e) => Some(e),
            _ => None,
        }
    }
}

pub type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;
pub type RegisterCallback = Arc<dyn Fn(&dyn Handler) + Send + Sync>;
pub type RequestCallback = Arc<dyn Fn(&Request) + Send + Sync>;
pub type ResponseCallback = Arc<dyn Fn(&Response) + Send + Sync>;

/// Optional lifecycle notifications for the embedding application.
///
/// Callbacks are invoked synchronously at the corresponding lifecycle point;
/// all are optional.
#[derive(Clone, Default)]
pub struct ServerDelegate {
    pub on_start: Option<LifecycleCallback>,
    pub on_reset: Option<LifecycleCallback>,
    pub on_register: Option<RegisterCallback>,
    pub on_receive: Option<RequestCallback>,
    pub on_complete: Option<ResponseCallback>,
    pub on_stop: Option<LifecycleCallback>,
}

struct ServerInner {
    config: ServerConfig,
    state: Mutex<ServerState>,
    prototypes: RwLock<Vec<Arc<dyn Handler>>>,
    registry: RequestRegistry,
    delegate: RwLock<ServerDelegate>,
    server_error: Mutex<Option<ServerError>>,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

/// Embeddable HTTP/1.1 server. Cheap to clone; clones share one instance.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let server = Self {
            inner: Arc::new(ServerInner {
                config,
                state: Mutex::new(ServerState::Idle),
                prototypes: RwLock::new(Vec::new()),
                registry: RequestRegistry::new(),
                delegate: RwLock::new(ServerDelegate::default()),
                server_error: Mutex::new(None),
                local_addr: Mutex::new(None),
                shutdown: Mutex::new(None),
                accept_task: Mutex::new(None),
            }),
        };
        // The 501 fallback is present from the first dispatch onward.
        server.reset_prototypes();
        server
    }

    /// Server on an explicit port, otherwise default configuration.
    pub fn on_port(port: u16) -> Self {
        let config = ServerConfig {
            port,
            ..ServerConfig::default()
        };
        Self::new(config)
    }

    pub fn state(&self) -> ServerState {
        *lock(&self.inner.state)
    }

    /// Configured port (the bound port once the server has started, which
    /// matters when configured with port 0).
    pub fn port(&self) -> u16 {
        lock(&self.inner.local_addr)
            .map(|addr| addr.port())
            .unwrap_or(self.inner.config.port)
    }

    /// Bound socket address, once running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.inner.local_addr)
    }

    /// Root URL requests are resolved against.
    pub fn root_url(&self) -> Url {
        let raw = format!("http://{}:{}/", self.inner.config.host, self.port());
        Url::parse(&raw).unwrap_or_else(|_| {
            Url::parse("http://127.0.0.1:8080/").expect("literal URL parses")
        })
    }

    /// Most recent server-level error, formatted.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.server_error)
            .as_ref()
            .map(|e| e.to_string())
    }

    /// Number of requests whose response has not yet completed.
    pub fn requests_in_flight(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn set_delegate(&self, delegate: ServerDelegate) {
        *write(&self.inner.delegate) = delegate;
    }

    /// Registers a prototype at the top of the dispatch order.
    ///
    /// The most recently registered prototype is consulted first, so late
    /// registrations override earlier defaults. Valid in any state; affects
    /// only future dispatches.
    pub fn register_handler(&self, prototype: Arc<dyn Handler>) {
        write(&self.inner.prototypes).push(Arc::clone(&prototype));
        debug!(total = read(&self.inner.prototypes).len(), "handler registered");
        // Notify after the push, so a callback that exercises the server
        // already sees the prototype in the dispatch order.
        let delegate = self.delegate();
        if let Some(on_register) = &delegate.on_register {
            on_register(prototype.as_ref());
        }
    }

    /// Clears all prototypes and reinstalls the 501 fallback.
    pub fn reset_prototypes(&self) {
        {
            let mut prototypes = write(&self.inner.prototypes);
            prototypes.clear();
            prototypes.push(Arc::new(NotImplementedHandler));
        }
        let delegate = self.delegate();
        if let Some(on_reset) = &delegate.on_reset {
            on_reset();
        }
    }

    /// Binds the listening socket and begins accepting connections.
    ///
    /// Valid only from Idle. On bind failure the error is recorded, the
    /// server returns to Idle, and no connections are accepted.
    pub async fn start(&self) -> Result<(), ServerError> {
        {
            let mut state = lock(&self.inner.state);
            if *state != ServerState::Idle {
                return Err(ServerError::InvalidState(*state));
            }
            *state = ServerState::Starting;
        }

        if self.inner.config.port != 0 && self.inner.config.port < 1024 {
            warn!(
                port = self.inner.config.port,
                "binding a privileged port is discouraged"
            );
        }

        let addr = self.inner.config.listen_addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(%addr, error = %e, "failed to bind");
                *lock(&self.inner.state) = ServerState::Idle;
                let returned = ServerError::Bind(io::Error::new(e.kind(), e.to_string()));
                *lock(&self.inner.server_error) = Some(ServerError::Bind(e));
                return Err(returned);
            }
        };

        *lock(&self.inner.local_addr) = listener.local_addr().ok();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *lock(&self.inner.shutdown) = Some(shutdown_tx);
        *lock(&self.inner.state) = ServerState::Running;

        info!(addr = %self.root_url(), "server started");
        let delegate = self.delegate();
        if let Some(on_start) = &delegate.on_start {
            on_start();
        }

        let server = self.clone();
        let task = tokio::spawn(async move {
            server.accept_loop(listener, shutdown_rx).await;
        });
        *lock(&self.inner.accept_task) = Some(task);

        Ok(())
    }

    /// Graceful shutdown: stops accepting immediately, drains in-flight
    /// requests for the configured grace period, force-closes stragglers.
    ///
    /// A no-op outside Running. A drain timeout is recorded as a server
    /// error but does not fail the call.
    pub async fn stop(&self) -> Result<(), ServerError> {
        {
            let mut state = lock(&self.inner.state);
            if *state != ServerState::Running {
                return Ok(());
            }
            *state = ServerState::Stopping;
        }
        info!("server stopping");

        if let Some(shutdown) = lock(&self.inner.shutdown).take() {
            let _ = shutdown.send(true);
        }
        let accept_task = lock(&self.inner.accept_task).take();
        if let Some(task) = accept_task {
            // The accept loop exits on the shutdown signal and drops the
            // listener, closing the socket.
            let _ = task.await;
        }

        let grace = Duration::from_secs(self.inner.config.grace_period_secs);
        if !self.inner.registry.drain(grace).await {
            let aborted = self.inner.registry.abort_all();
            warn!(aborted, "drain grace period elapsed; force-closed stragglers");
            *lock(&self.inner.server_error) = Some(ServerError::DrainTimeout { aborted });
        }

        *lock(&self.inner.local_addr) = None;
        *lock(&self.inner.state) = ServerState::Idle;
        info!("server stopped");
        let delegate = self.delegate();
        if let Some(on_stop) = &delegate.on_stop {
            on_stop();
        }
        Ok(())
    }

    async fn accept_loop(&self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                },
                _ = shutdown.changed() => break,
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let id = self.inner.registry.next_id();
        debug!(%peer, id, "accepted connection");

        let (read_half, write_half) = stream.into_split();
        let mut request = Request::new(Box::new(read_half), self.root_url());
        request.set_max_head_bytes(self.inner.config.max_head_bytes);
        let response = Response::new(Box::new(write_half));

        self.inner.registry.insert(id, InflightRequest::new(peer));

        let server = self.clone();
        let task = tokio::spawn(async move {
            server.handle_connection(id, peer, request, response).await;
            server.inner.registry.remove(id);
        });
        self.inner.registry.set_abort(id, task.abort_handle());
    }

    async fn handle_connection(
        &self,
        id: u64,
        peer: SocketAddr,
        mut request: Request,
        mut response: Response,
    ) {
        let delegate = self.delegate();

        if let Err(e) = request.read_headers().await {
            warn!(%peer, id, error = %e, "failed to read request head");
            let code = match e {
                RequestError::HeadersTooLarge => status::REQUEST_HEADER_FIELDS_TOO_LARGE,
                _ => status::BAD_REQUEST,
            };
            // Best effort; the stream may already be gone.
            let _ = response
                .send_simple(code, "text/plain", e.to_string().as_bytes())
                .await;
            response.complete_response().await;
            request.complete_request();
            if let Some(on_complete) = &delegate.on_complete {
                on_complete(&response);
            }
            return;
        }

        if let Some(on_receive) = &delegate.on_receive {
            on_receive(&request);
        }
        info!(
            %peer,
            id,
            method = %request.method().map(|m| m.as_str()).unwrap_or("-"),
            target = request.target().unwrap_or("-"),
            "request received"
        );

        // Chunked framing is out of scope; reject rather than misread.
        let declares_chunked = request
            .headers()
            .get(header::TRANSFER_ENCODING)
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
        if declares_chunked {
            let _ = response
                .send_simple(
                    status::NOT_IMPLEMENTED,
                    "text/plain",
                    b"chunked transfer-coding is not supported",
                )
                .await;
            response.complete_response().await;
            request.complete_request();
            if let Some(on_complete) = &delegate.on_complete {
                on_complete(&response);
            }
            return;
        }

        let advisory = self.dispatch(&mut request, &mut response).await;

        // A handler that never sent anything still owes the client a reply.
        if response.status() == 0 {
            let _ = response
                .send_simple(
                    status::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    b"500 Internal Server Error",
                )
                .await;
        }
        if let Some(e) = response.output_error() {
            debug!(%peer, id, error = %e, "response write failure");
        }

        response.complete_response().await;
        request.complete_request();

        if let Some(on_complete) = &delegate.on_complete {
            on_complete(&response);
        }
        debug!(%peer, id, status = response.status(), advisory, "request completed");
    }

    /// Walks the prototype snapshot, most recently registered first, clones
    /// the first match and runs it. The list always holds the 501 fallback,
    /// so a handler is always found.
    async fn dispatch(&self, request: &mut Request, response: &mut Response) -> u16 {
        let snapshot: Vec<Arc<dyn Handler>> = read(&self.inner.prototypes).clone();

        let mut clone = snapshot
            .iter()
            .rev()
            .find(|prototype| prototype.can_handle(request))
            .map(|prototype| prototype.for_request(request))
            .unwrap_or_else(|| Box::new(NotImplementedHandler));

        clone.handle(request, response).await
    }

    fn delegate(&self) -> ServerDelegate {
        read(&self.inner.delegate).clone()
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state())
            .field("port", &self.port())
            .field("in_flight", &self.requests_in_flight())
            .finish()
    }
}

// Poisoned locks mean a panicking callback or task; the guarded data is
// still coherent, so recover the guard instead of propagating the panic.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(rwlock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(rwlock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(|e| e.into_inner())
}

//! In-flight request registry.
//!
//! Every connection task inserts itself on accept and removes itself on
//! completion; [`Server::stop`](crate::server::Server::stop) drains the
//! registry during graceful shutdown. The map is guarded by a plain mutex
//! (never held across an await); drain waiters park on a [`Notify`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::warn;

/// Bookkeeping for one in-flight request.
#[derive(Debug)]
pub struct InflightRequest {
    pub peer: SocketAddr,
    pub accepted_at: Instant,
    abort: Option<AbortHandle>,
}

impl InflightRequest {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            accepted_at: Instant::now(),
            abort: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct RequestRegistry {
    inner: Arc<Mutex<HashMap<u64, InflightRequest>>>,
    drained: Arc<Notify>,
    next_id: Arc<AtomicU64>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a connection id.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, id: u64, entry: InflightRequest) {
        self.lock().insert(id, entry);
    }

    /// Attaches the connection task's abort handle. A no-op if the task
    /// already completed and removed itself.
    pub fn set_abort(&self, id: u64, handle: AbortHandle) {
        if let Some(entry) = self.lock().get_mut(&id) {
            entry.abort = Some(handle);
        }
    }

    pub fn remove(&self, id: u64) {
        let removed = self.lock().remove(&id);
        if removed.is_some() {
            self.drained.notify_waiters();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Waits until the registry is empty, bounded by `grace`. Returns true
    /// if everything completed in time.
    pub async fn drain(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, async {
            loop {
                let notified = self.drained.notified();
                tokio::pin!(notified);
                // Register for wakeups before re-checking, so a removal
                // between the check and the await is never missed.
                notified.as_mut().enable();
                if self.is_empty() {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    /// Force-closes every remaining connection task. Returns how many were
    /// aborted.
    pub fn abort_all(&self) -> usize {
        let entries: Vec<InflightRequest> = {
            let mut map = self.lock();
            map.drain().map(|(_, entry)| entry).collect()
        };
        let aborted = entries.len();
        for entry in entries {
            warn!(
                peer = %entry.peer,
                age_ms = entry.accepted_at.elapsed().as_millis() as u64,
                "force-closing in-flight request"
            );
            if let Some(handle) = entry.abort {
                handle.abort();
            }
        }
        self.drained.notify_waiters();
        aborted
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, InflightRequest>> {
        // A poisoned registry mutex means a panic while holding the lock;
        // the map itself is still coherent, so keep going.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

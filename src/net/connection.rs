//! Connection and stream identity, plus lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing and correlation
//! - Name each multiplexed stream as `(connection, stream number)`
//! - Count active connections so shutdown can drain them

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One logical stream multiplexed on a connection.
///
/// Its display form is the transport identity handed to the correlator.
/// `generation` counts streams opened on the connection, so a reused stream
/// number never collides with a predecessor that is still shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamKey {
    /// Connection the stream is multiplexed on.
    pub connection: ConnectionId,
    /// Client-chosen stream number.
    pub stream: u64,
    /// Streams opened on the connection before this one.
    pub generation: u64,
}

impl StreamKey {
    pub fn new(connection: ConnectionId, stream: u64, generation: u64) -> Self {
        Self {
            connection,
            stream,
            generation,
        }
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}.{}", self.connection, self.stream, self.generation)
    }
}

/// Tracks active connections for graceful shutdown.
///
/// Uses a watch channel to signal when the active count changes.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    /// Current count of active connections.
    active_count: Arc<AtomicU64>,
    /// Publishes the count after every change.
    count_tx: Arc<watch::Sender<u64>>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            active_count: Arc::new(AtomicU64::new(0)),
            count_tx: Arc::new(tx),
        }
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let count = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.count_tx.send_replace(count);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            count_tx: Arc::clone(&self.count_tx),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed.
    pub async fn wait_for_drain(&self) {
        let mut rx = self.count_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx
            .wait_for(|_| self.active_count.load(Ordering::SeqCst) == 0)
            .await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    count_tx: Arc<watch::Sender<u64>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let count = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        self.count_tx.send_replace(count);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

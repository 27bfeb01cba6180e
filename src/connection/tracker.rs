//! Connection Tracking
//!
//! Counts live and total connections for a single server. Each accepted
//! connection holds a [`ConnectionGuard`]; dropping the guard when the reader
//! task ends decrements the live count. Tracking is observational only:
//! shutdown never waits on it.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// Per-server connection identifier, rendered as `conn-N`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStats {
    pub active_connections: usize,
    pub total_connections_accepted: u64,
}

/// Shared counters for one server's connections
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted connection
    pub fn track(&self, remote: SocketAddr) -> ConnectionGuard {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            id,
            remote,
            started: Instant::now(),
            active: Arc::clone(&self.active),
        }
    }

    /// Number of connections whose reader has not finished yet
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            active_connections: self.active_count(),
            total_connections_accepted: self.next_id.load(Ordering::Relaxed),
        }
    }
}

/// Keeps a connection counted as active until dropped
#[derive(Debug)]
pub struct ConnectionGuard {
    id: ConnectionId,
    remote: SocketAddr,
    started: Instant,
    active: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        trace!(
            connection_id = %self.id,
            remote = %self.remote,
            duration = ?self.started.elapsed(),
            "Connection released"
        );
    }
}

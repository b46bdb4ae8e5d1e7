//! In-flight work tracking per site.
//!
//! # Responsibilities
//! - Generate unique IDs for accepted connections and received datagrams
//! - Count in-flight units per site for drain reporting
//! - Keep the in-flight gauge in step with guard lifetimes

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an accepted connection or a received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

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

/// Counts the units of work a site has handed to its handler and not yet
/// seen finish.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    site: Arc<str>,
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new(site: impl Into<Arc<str>>) -> Self {
        Self {
            site: site.into(),
            active_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a new unit of work. The returned guard decrements on drop,
    /// including when the task holding it is aborted.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::in_flight_changed(&self.site, 1.0);
        ConnectionGuard {
            site: Arc::clone(&self.site),
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks one unit of work.
#[derive(Debug)]
pub struct ConnectionGuard {
    site: Arc<str>,
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::in_flight_changed(&self.site, -1.0);
        tracing::trace!(site = %self.site, connection_id = %self.id, "Work finished");
    }
}

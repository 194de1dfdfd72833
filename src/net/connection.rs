//! Pooled upstream connections.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing and pool bookkeeping
//! - Hold the HTTP/1.1 request sender for one established transport
//! - Track creation and idle timestamps for eviction
//!
//! # States
//! ```text
//! Connecting → InUse ⇄ Idle → Closed
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::Full;
use hyper::client::conn::http1::SendRequest;

use crate::http::request::Endpoint;
use crate::resilience::timeouts::StallLimit;

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

/// An established transport to one endpoint, ready to carry requests.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    endpoint: Endpoint,
    sender: SendRequest<Full<Bytes>>,
    write_stall: StallLimit,
    created_at: Instant,
    idle_since: Instant,
}

impl Connection {
    pub fn new(endpoint: Endpoint, sender: SendRequest<Full<Bytes>>, write_stall: StallLimit) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            endpoint,
            sender,
            write_stall,
            created_at: now,
            idle_since: now,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn sender(&mut self) -> &mut SendRequest<Full<Bytes>> {
        &mut self.sender
    }

    /// Apply the calling attempt's write-stall limit to the transport.
    pub fn set_write_stall(&self, limit: Option<Duration>) {
        self.write_stall.set(limit);
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn idle_for(&self) -> Duration {
        self.idle_since.elapsed()
    }

    /// Stamp the moment the connection went back to the idle set.
    pub fn mark_idle(&mut self) {
        self.idle_since = Instant::now();
    }

    /// The background connection task has ended; the sender is unusable.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// True if the connection should not be handed out again.
    pub fn is_expired(&self, max_idle: Duration, max_lifetime: Duration) -> bool {
        self.is_closed() || self.idle_for() >= max_idle || self.age() >= max_lifetime
    }
}

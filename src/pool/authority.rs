//! Per-authority connection slots.
//!
//! # Responsibilities
//! - Enforce the max connection limit for one (scheme, host, port)
//! - Keep released connections in an idle list, most recent last
//! - Discard connections that are expired, closed, or abandoned
//!
//! A slot permit is held only while a connection is in use. New connections
//! are opened only when the idle list has nothing usable, so idle + in use
//! never exceeds the limit.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::PoolConfig;
use crate::http::request::Endpoint;
use crate::net::Connection;
use crate::observability::metrics;

/// Idle/in-use snapshot for one authority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub in_use: usize,
}

/// Number of slots a semaphore can actually hold for `max_connections`.
fn slot_count(max_connections: usize) -> usize {
    max_connections.min(Semaphore::MAX_PERMITS)
}

/// Slots and idle connections for a single endpoint.
#[derive(Debug)]
pub struct AuthorityPool {
    endpoint: Endpoint,
    config: PoolConfig,
    slots: Arc<Semaphore>,
    idle: Mutex<VecDeque<Connection>>,
    closed: AtomicBool,
}

impl AuthorityPool {
    pub fn new(endpoint: Endpoint, config: PoolConfig) -> Self {
        Self {
            endpoint,
            slots: Arc::new(Semaphore::new(slot_count(config.max_connections))),
            config,
            idle: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn slots(&self) -> Arc<Semaphore> {
        Arc::clone(&self.slots)
    }

    fn idle_list(&self) -> std::sync::MutexGuard<'_, VecDeque<Connection>> {
        // A poisoned lock still guards a consistent deque.
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_expired(&self, conn: &Connection) -> bool {
        conn.is_expired(self.config.max_idle(), self.config.max_lifetime())
    }

    /// Pop the most recently released usable connection, closing stale ones on the way.
    pub fn take_idle(&self) -> Option<Connection> {
        let mut idle = self.idle_list();
        while let Some(conn) = idle.pop_back() {
            if self.is_expired(&conn) {
                self.discard(conn, "expired");
                continue;
            }
            return Some(conn);
        }
        None
    }

    /// Return a connection to the idle list, or close it if it can't be reused.
    pub fn put_idle(&self, mut conn: Connection) {
        if self.closed.load(Ordering::Acquire) {
            self.discard(conn, "pool_closed");
            return;
        }
        if self.is_expired(&conn) {
            self.discard(conn, "expired");
            return;
        }
        conn.mark_idle();
        self.idle_list().push_back(conn);
    }

    /// Close every idle connection that is past its idle or lifetime limit.
    pub fn evict_expired(&self) -> usize {
        let mut idle = self.idle_list();
        let (keep, expired): (VecDeque<_>, VecDeque<_>) =
            idle.drain(..).partition(|c| !self.is_expired(c));
        *idle = keep;
        drop(idle);

        let count = expired.len();
        for conn in expired {
            self.discard(conn, "expired");
        }
        count
    }

    pub fn stats(&self) -> PoolStats {
        let in_use = slot_count(self.config.max_connections).saturating_sub(self.slots.available_permits());
        PoolStats {
            idle: self.idle_list().len(),
            in_use,
        }
    }

    /// Reject future acquires and drop all idle connections.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.slots.close();
        let drained: Vec<_> = self.idle_list().drain(..).collect();
        for conn in drained {
            self.discard(conn, "pool_closed");
        }
    }

    fn discard(&self, conn: Connection, reason: &'static str) {
        tracing::trace!(
            connection_id = %conn.id(),
            endpoint = %self.endpoint,
            reason,
            "Closing pooled connection"
        );
        metrics::record_connection_evicted(reason);
    }
}

/// A connection checked out of the pool, holding one slot.
///
/// Release it through the pool to make it reusable. Dropping it instead
/// closes the connection and frees the slot.
#[derive(Debug)]
pub struct PooledConnection {
    conn: Option<Connection>,
    authority: Arc<AuthorityPool>,
    reused: bool,
    // Dropped last, after the connection has been parked or discarded.
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub(crate) fn new(
        conn: Connection,
        authority: Arc<AuthorityPool>,
        permit: OwnedSemaphorePermit,
        reused: bool,
    ) -> Self {
        Self {
            conn: Some(conn),
            authority,
            reused,
            _permit: permit,
        }
    }

    /// True if this connection came from the idle list.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub(crate) fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.authority.put_idle(conn);
        }
        self.authority.evict_expired();
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        // Only `release` and `drop` take the connection, and both consume the guard.
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.authority.discard(conn, "abandoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Scheme;

    fn endpoint() -> Endpoint {
        Endpoint::new(Scheme::Http, "127.0.0.1", 80)
    }

    #[test]
    fn test_oversized_limit_is_clamped() {
        let pool = AuthorityPool::new(
            endpoint(),
            PoolConfig {
                max_connections: usize::MAX,
                ..PoolConfig::default()
            },
        );
        assert_eq!(pool.slots().available_permits(), Semaphore::MAX_PERMITS);
        assert_eq!(pool.stats(), PoolStats { idle: 0, in_use: 0 });
    }

    #[tokio::test]
    async fn test_stats_count_held_slots() {
        let pool = AuthorityPool::new(endpoint(), PoolConfig::default());
        let _permit = pool.slots().acquire_owned().await.unwrap();
        assert_eq!(pool.stats(), PoolStats { idle: 0, in_use: 1 });
        assert_eq!(pool.evict_expired(), 0);
    }
}

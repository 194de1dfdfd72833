//! Connection pool registry.
//!
//! # Responsibilities
//! - Lazily create one `AuthorityPool` per endpoint on first use
//! - Wait for a slot, bounded by the acquire timeout
//! - Prefer idle connections, otherwise open a new one via the connector
//! - Sweep idle connections and shut everything down on close

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::PoolConfig;
use crate::error::TransportFailure;
use crate::http::request::Endpoint;
use crate::net::Connector;
use crate::observability::metrics;
use crate::pool::authority::{AuthorityPool, PoolStats, PooledConnection};

/// Bounded, reusable connections keyed by endpoint.
#[derive(Debug)]
pub struct ConnectionPool {
    config: PoolConfig,
    connector: Connector,
    authorities: DashMap<Endpoint, Arc<AuthorityPool>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig, connector: Connector) -> Self {
        Self {
            config,
            connector,
            authorities: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn authority(&self, endpoint: &Endpoint) -> Arc<AuthorityPool> {
        if let Some(existing) = self.authorities.get(endpoint) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .authorities
            .entry(endpoint.clone())
            .or_insert_with(|| Arc::new(AuthorityPool::new(endpoint.clone(), self.config.clone())));
        Arc::clone(entry.value())
    }

    /// Check out a connection to `endpoint`.
    ///
    /// Waits up to the acquire timeout for a free slot, then reuses the most
    /// recently released idle connection or opens a new one within `connect_timeout`.
    pub async fn acquire(
        &self,
        endpoint: &Endpoint,
        connect_timeout: Option<Duration>,
    ) -> Result<PooledConnection, TransportFailure> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportFailure::PoolClosed);
        }

        let authority = self.authority(endpoint);
        let waited = self.config.acquire_timeout();
        let permit = match tokio::time::timeout(waited, authority.slots().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(TransportFailure::PoolClosed),
            Err(_) => {
                tracing::warn!(endpoint = %endpoint, waited = ?waited, "Connection pool exhausted");
                return Err(TransportFailure::PoolExhausted {
                    endpoint: endpoint.clone(),
                    waited,
                });
            }
        };

        authority.evict_expired();
        if let Some(conn) = authority.take_idle() {
            tracing::trace!(connection_id = %conn.id(), endpoint = %endpoint, "Reusing idle connection");
            return Ok(PooledConnection::new(conn, authority, permit, true));
        }

        let conn = self.connector.connect(endpoint, connect_timeout).await?;
        metrics::record_connection_opened();
        Ok(PooledConnection::new(conn, authority, permit, false))
    }

    /// Give a connection back for reuse. Expired or closed connections are dropped.
    pub fn release(&self, conn: PooledConnection) {
        conn.release();
    }

    /// Sweep every authority's idle list. Returns the number of connections closed.
    pub fn evict(&self) -> usize {
        self.authorities
            .iter()
            .map(|entry| entry.value().evict_expired())
            .sum()
    }

    /// Idle and in-use counts for one endpoint.
    pub fn stats(&self, endpoint: &Endpoint) -> PoolStats {
        self.authorities
            .get(endpoint)
            .map(|entry| entry.value().stats())
            .unwrap_or_default()
    }

    /// Reject future acquires, wake waiters with `PoolClosed`, and drop idle connections.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for entry in self.authorities.iter() {
            entry.value().close();
        }
        tracing::debug!(authorities = self.authorities.len(), "Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.close();
    }
}

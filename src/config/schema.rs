//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits so they can be built in code or loaded from
//! a config file. Durations are expressed in milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http::status::StatusRule;
use crate::resilience::failover::FailoverRules;
use crate::resilience::retries::RetryPolicy;

/// Root configuration for a client instance.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection pool limits and eviction.
    pub pool: PoolConfig,

    /// Per-attempt timeouts.
    pub timeouts: TimeoutConfig,

    /// Default retry policy.
    pub retries: RetryPolicy,

    /// Status codes converted into named failures, checked in order.
    pub status_rules: Vec<StatusRule>,

    /// Default failover table.
    pub failover: FailoverRules,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum open connections per authority.
    pub max_connections: usize,

    /// Idle connections older than this are closed instead of reused.
    pub max_idle_ms: u64,

    /// Connections older than this are closed instead of reused.
    pub max_lifetime_ms: u64,

    /// How long `acquire` waits for a free slot.
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_idle_ms: 5_000,
            max_lifetime_ms: 5_000,
            acquire_timeout_ms: 45_000,
        }
    }
}

impl PoolConfig {
    pub fn max_idle(&self) -> Duration {
        Duration::from_millis(self.max_idle_ms)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_millis(self.max_lifetime_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Timeout configuration for one attempt. Unset or zero means no limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connect plus TLS handshake.
    pub connect_ms: Option<u64>,

    /// Request handed to the connection until response headers arrive.
    pub response_ms: Option<u64>,

    /// Longest gap between body frames.
    pub read_stall_ms: Option<u64>,

    /// Longest time a transport write may make no progress.
    pub write_stall_ms: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: Some(5_000),
            response_ms: Some(30_000),
            read_stall_ms: Some(30_000),
            write_stall_ms: Some(30_000),
        }
    }
}

fn ms(d: Duration) -> Option<u64> {
    Some(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn enabled(limit: Option<u64>) -> Option<Duration> {
    limit.filter(|ms| *ms > 0).map(Duration::from_millis)
}

impl TimeoutConfig {
    /// No limits at all.
    pub fn unbounded() -> Self {
        Self {
            connect_ms: None,
            response_ms: None,
            read_stall_ms: None,
            write_stall_ms: None,
        }
    }

    pub fn connect(&self) -> Option<Duration> {
        enabled(self.connect_ms)
    }

    pub fn response(&self) -> Option<Duration> {
        enabled(self.response_ms)
    }

    pub fn read_stall(&self) -> Option<Duration> {
        enabled(self.read_stall_ms)
    }

    pub fn write_stall(&self) -> Option<Duration> {
        enabled(self.write_stall_ms)
    }

    pub fn with_connect(mut self, timeout: Duration) -> Self {
        self.connect_ms = ms(timeout);
        self
    }

    pub fn with_response(mut self, timeout: Duration) -> Self {
        self.response_ms = ms(timeout);
        self
    }

    pub fn with_read_stall(mut self, timeout: Duration) -> Self {
        self.read_stall_ms = ms(timeout);
        self
    }

    pub fn with_write_stall(mut self, timeout: Duration) -> Self {
        self.write_stall_ms = ms(timeout);
        self
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) used when RUST_LOG is unset.
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define client metrics (calls, attempts, retries, pool churn)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `client_calls_total` (counter): finished calls by result
//! - `client_call_duration_seconds` (histogram): end-to-end call latency
//! - `client_attempts_total` (counter): attempts by outcome
//! - `client_retries_total` (counter): retries by the outcome that triggered them
//! - `client_pool_connections_opened_total` (counter)
//! - `client_pool_connections_evicted_total` (counter): closed pooled connections by reason
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Labels are low-cardinality static strings

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::http::outcome::OutcomeTag;

/// Install the Prometheus recorder and its HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_call(result: &'static str, start: Instant) {
    counter!("client_calls_total", "result" => result).increment(1);
    histogram!("client_call_duration_seconds", "result" => result).record(start.elapsed().as_secs_f64());
}

pub fn record_attempt(outcome: OutcomeTag) {
    counter!("client_attempts_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_retry(outcome: OutcomeTag) {
    counter!("client_retries_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_connection_opened() {
    counter!("client_pool_connections_opened_total").increment(1);
}

pub fn record_connection_evicted(reason: &'static str) {
    counter!("client_pool_connections_evicted_total", "reason" => reason).increment(1);
}

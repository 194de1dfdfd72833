//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Client, pool and retry loop produce:
//!     → tracing spans/events (call span carries the call id)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Call ID flows through every event of a call
//! - Metrics are cheap (atomic increments) and no-ops until a recorder is installed

pub mod logging;
pub mod metrics;

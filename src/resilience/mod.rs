//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Each attempt:
//!     → timeouts.rs (connect, response, read-stall and write-stall deadlines)
//! After each attempt:
//!     → retries.rs (eligible? tries left? retry-safe? wait per backoff.rs)
//! After the last attempt:
//!     → failover.rs (propagate, suppress to a default, or remap)
//! ```
//!
//! # Design Decisions
//! - Timeouts are per attempt and independent; unset means unbounded
//! - Retries only for retry-safe requests (idempotent methods unless overridden)
//! - Policies are plain data so they can come from config files

pub mod backoff;
pub mod failover;
pub mod retries;
pub mod timeouts;

pub use failover::{FailoverAction, FailoverRule, FailoverRules};
pub use retries::{run_with_retry, Backoff, RetryPolicy};

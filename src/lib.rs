//! Resilient outbound HTTP client.
//!
//! Issues requests over pooled connections, enforces independent connect,
//! response, read-stall and write-stall timeouts, classifies every attempt
//! into an [`Outcome`], and applies retry/backoff and failover policies
//! before handing back one [`Reply`] or one typed [`Failure`].

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod pool;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::ClientConfig;
pub use error::{ClientResult, Failure, PolicyError, TransportFailure, TransportKind};
pub use http::{
    CallPolicy, Client, Outcome, OutcomeMatch, Reply, RequestDescriptor, Response, StatusMatch, StatusRule,
};
pub use lifecycle::Shutdown;
pub use resilience::{FailoverAction, FailoverRule, FailoverRules, RetryPolicy};

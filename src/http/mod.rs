//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Caller
//!     → request.rs (RequestDescriptor: validated target, headers, retry-safety)
//!     → client.rs (call span, retry loop, per-attempt exchange)
//!     → status.rs (status code + rules → Outcome)
//!     → outcome.rs (tagged attempt result, data matchers)
//!     → response.rs (Reply handed back to the caller)
//! ```

pub mod client;
pub mod outcome;
pub mod request;
pub mod response;
pub mod status;

pub use client::{CallPolicy, Client, ClientBuilder};
pub use outcome::{Outcome, OutcomeMatch, OutcomeTag};
pub use request::{Endpoint, RequestBuilder, RequestDescriptor, Scheme, X_REQUEST_ID};
pub use response::{Reply, Response};
pub use status::{StatusClassifier, StatusMatch, StatusRule};

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Client::shutdown → broadcast → in-flight calls return Cancelled → pool closed
//!
//! Signals (signals.rs):
//!     SIGINT → cancel future for the demo binary's call
//! ```
//!
//! # Design Decisions
//! - Shutdown is sticky: calls started afterwards see it immediately
//! - Cancellation drops the in-flight connection instead of draining it

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};

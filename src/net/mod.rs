//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Pool needs a new connection
//!     → connector.rs (TCP connect, bounded by the connect timeout)
//!     → tls.rs (TLS handshake for https endpoints)
//!     → connection.rs (HTTP/1.1 sender + timestamps, handed to the pool)
//!
//! Connection States:
//!     Connecting → InUse ⇄ Idle → Closed
//! ```
//!
//! # Design Decisions
//! - Each connection carries exactly one request at a time
//! - The hyper connection driver runs on its own task
//! - TLS is selected by the endpoint scheme and handled transparently

pub mod connection;
pub mod connector;
pub mod tls;

pub use connection::{Connection, ConnectionId};
pub use connector::Connector;

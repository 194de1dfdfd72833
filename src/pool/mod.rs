//! Connection pool subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt needs a connection
//!     → manager.rs (find or create the AuthorityPool for the endpoint)
//!     → authority.rs (wait for a slot, reuse idle or open new)
//!     → PooledConnection (exclusively owned by one attempt)
//!     → release (back to idle) or drop (closed, slot freed)
//! ```
//!
//! # Design Decisions
//! - Slots are a per-authority semaphore; waiting is async and bounded
//! - Idle reuse is LIFO so the warmest connection goes out first
//! - No retry logic lives here

pub mod authority;
pub mod manager;

pub use authority::{PoolStats, PooledConnection};
pub use manager::ConnectionPool;

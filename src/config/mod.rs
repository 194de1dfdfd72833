//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! code (ClientConfig { .. }) or config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → handed to Client::new, which splits it into pool + default call policy
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a client is built
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ClientConfig;
pub use schema::ObservabilityConfig;
pub use schema::PoolConfig;
pub use schema::TimeoutConfig;

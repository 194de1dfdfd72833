//! Typed failures surfaced by the client.
//!
//! # Taxonomy
//! ```text
//! TransportFailure   no classifiable HTTP response exists (retryable by default)
//! ClientError        4xx, definitive request-side problem (not retried by default)
//! ServerError        5xx or unknown status (retryable by default)
//! Flagged            status converted by a status rule
//! Policy             fatal policy violation, never retried or remapped
//! Remapped           output of a failover Remap rule
//! InvalidConfig      client built from a configuration that failed validation
//! ```

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::validation::ValidationError;
use crate::http::request::Endpoint;

/// Failures that happen before a classifiable response exists.
#[derive(Debug, Clone, Error)]
pub enum TransportFailure {
    /// No pool slot became free within the acquire timeout.
    #[error("connection pool for {endpoint} exhausted after waiting {waited:?}")]
    PoolExhausted { endpoint: Endpoint, waited: Duration },

    /// The pool was shut down.
    #[error("connection pool is closed")]
    PoolClosed,

    /// Transport establishment (TCP + TLS) exceeded the connect timeout.
    #[error("connect to {endpoint} timed out after {after:?}")]
    ConnectTimeout { endpoint: Endpoint, after: Duration },

    /// The peer actively refused the connection.
    #[error("connection to {endpoint} refused")]
    ConnectionRefused { endpoint: Endpoint },

    /// Response headers did not arrive within the response timeout.
    #[error("no response headers within {after:?}")]
    ResponseTimeout { after: Duration },

    /// Body transfer stopped making progress.
    #[error("{direction} stalled: {reason}")]
    StreamStall { direction: StallDirection, reason: String },

    /// Any other transport-level error (reset, closed, TLS, protocol).
    #[error("connection error: {0}")]
    Connection(String),
}

impl TransportFailure {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportFailure::PoolExhausted { .. } => TransportKind::PoolExhausted,
            TransportFailure::PoolClosed => TransportKind::PoolClosed,
            TransportFailure::ConnectTimeout { .. } => TransportKind::ConnectTimeout,
            TransportFailure::ConnectionRefused { .. } => TransportKind::ConnectionRefused,
            TransportFailure::ResponseTimeout { .. } => TransportKind::ResponseTimeout,
            TransportFailure::StreamStall { .. } => TransportKind::StreamStall,
            TransportFailure::Connection(_) => TransportKind::Connection,
        }
    }
}

/// Fieldless view of [`TransportFailure`], used by outcome matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    PoolExhausted,
    PoolClosed,
    ConnectTimeout,
    ConnectionRefused,
    ResponseTimeout,
    StreamStall,
    Connection,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::PoolExhausted => "pool_exhausted",
            TransportKind::PoolClosed => "pool_closed",
            TransportKind::ConnectTimeout => "connect_timeout",
            TransportKind::ConnectionRefused => "connection_refused",
            TransportKind::ResponseTimeout => "response_timeout",
            TransportKind::StreamStall => "stream_stall",
            TransportKind::Connection => "connection",
        }
    }
}

/// Which side of the exchange stalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallDirection {
    Read,
    Write,
}

impl fmt::Display for StallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StallDirection::Read => write!(f, "read"),
            StallDirection::Write => write!(f, "write"),
        }
    }
}

/// Fatal policy violations.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The outcome was retry-eligible but the request is not marked retry-safe.
    #[error("{method} request is not retry-safe; refusing to retry after: {cause}")]
    NotRetrySafe {
        method: Method,
        #[source]
        cause: Box<Failure>,
    },
}

/// The single typed failure a call can end with.
#[derive(Debug, Error)]
pub enum Failure {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportFailure),

    #[error("client error: {status}")]
    ClientError { status: StatusCode, body: Bytes },

    #[error("server error: {status}")]
    ServerError { status: StatusCode, body: Bytes },

    /// A status rule converted the response into a named failure.
    #[error("status {status} rejected as `{label}`")]
    Flagged {
        label: String,
        status: StatusCode,
        body: Bytes,
    },

    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Produced by a failover Remap rule.
    #[error("{label}")]
    Remapped {
        label: String,
        #[source]
        source: Box<Failure>,
    },

    #[error("call cancelled")]
    Cancelled,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The client was built from a configuration that failed validation.
    #[error("invalid client configuration: {}", join_errors(.0))]
    InvalidConfig(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl Failure {
    /// Status code of the response behind this failure, if there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Failure::ClientError { status, .. }
            | Failure::ServerError { status, .. }
            | Failure::Flagged { status, .. } => Some(*status),
            Failure::Remapped { source, .. } => source.status(),
            Failure::Policy(PolicyError::NotRetrySafe { cause, .. }) => cause.status(),
            _ => None,
        }
    }

    /// Transport kind behind this failure, looking through remaps.
    pub fn transport_kind(&self) -> Option<TransportKind> {
        match self {
            Failure::Transport(t) => Some(t.kind()),
            Failure::Remapped { source, .. } => source.transport_kind(),
            Failure::Policy(PolicyError::NotRetrySafe { cause, .. }) => cause.transport_kind(),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, Failure>;

//! Per-attempt outcomes and the matchers that retry and failover policies use.

use serde::{Deserialize, Serialize};

use crate::error::{Failure, TransportFailure, TransportKind};
use crate::http::response::Response;

/// Result of exactly one attempt.
#[derive(Debug)]
pub enum Outcome {
    Success(Response),
    ClientError(Response),
    ServerError(Response),
    /// A status rule turned this response into a named failure.
    Flagged { label: String, response: Response },
    TransportFailure(TransportFailure),
}

/// Tag of an [`Outcome`], without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeTag {
    Success,
    ClientError,
    ServerError,
    Flagged,
    TransportFailure,
}

impl OutcomeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeTag::Success => "success",
            OutcomeTag::ClientError => "client_error",
            OutcomeTag::ServerError => "server_error",
            OutcomeTag::Flagged => "flagged",
            OutcomeTag::TransportFailure => "transport_failure",
        }
    }
}

impl Outcome {
    pub fn tag(&self) -> OutcomeTag {
        match self {
            Outcome::Success(_) => OutcomeTag::Success,
            Outcome::ClientError(_) => OutcomeTag::ClientError,
            Outcome::ServerError(_) => OutcomeTag::ServerError,
            Outcome::Flagged { .. } => OutcomeTag::Flagged,
            Outcome::TransportFailure(_) => OutcomeTag::TransportFailure,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Convert into the call-level result.
    pub fn into_result(self) -> Result<Response, Failure> {
        match self {
            Outcome::Success(response) => Ok(response),
            Outcome::ClientError(r) => Err(Failure::ClientError {
                status: r.status,
                body: r.body,
            }),
            Outcome::ServerError(r) => Err(Failure::ServerError {
                status: r.status,
                body: r.body,
            }),
            Outcome::Flagged { label, response } => Err(Failure::Flagged {
                label,
                status: response.status,
                body: response.body,
            }),
            Outcome::TransportFailure(t) => Err(Failure::Transport(t)),
        }
    }
}

/// A data predicate over failed outcomes.
///
/// Used both as the retry eligibility list and as the key of failover rules.
/// Successes never match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeMatch {
    AnyFailure,
    ClientError,
    ServerError,
    Transport,
    TransportKind(TransportKind),
    Status(u16),
    Flagged(String),
}

impl OutcomeMatch {
    pub fn matches(&self, outcome: &Outcome) -> bool {
        match (self, outcome) {
            (_, Outcome::Success(_)) => false,
            (OutcomeMatch::AnyFailure, _) => true,
            (OutcomeMatch::ClientError, Outcome::ClientError(_)) => true,
            (OutcomeMatch::ServerError, Outcome::ServerError(_)) => true,
            (OutcomeMatch::Transport, Outcome::TransportFailure(_)) => true,
            (OutcomeMatch::TransportKind(kind), Outcome::TransportFailure(t)) => t.kind() == *kind,
            (OutcomeMatch::Status(code), Outcome::ClientError(r) | Outcome::ServerError(r)) => {
                r.status.as_u16() == *code
            }
            (OutcomeMatch::Status(code), Outcome::Flagged { response, .. }) => {
                response.status.as_u16() == *code
            }
            (OutcomeMatch::Flagged(expected), Outcome::Flagged { label, .. }) => expected == label,
            _ => false,
        }
    }
}

//! Failover rules applied after retries are exhausted.
//!
//! # Responsibilities
//! - Map the terminal outcome of a call to a reply or exactly one failure
//! - Suppress selected failures to a caller-declared default value
//! - Remap selected failures to a coarser, named failure
//!
//! # Design Decisions
//! - First matching rule wins; no match propagates the failure unchanged
//! - Rules are data so they can live in config next to the retry policy

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Failure;
use crate::http::outcome::{Outcome, OutcomeMatch};
use crate::http::response::Reply;

/// What to do with a terminal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FailoverAction {
    /// Return the typed failure to the caller.
    Propagate,
    /// Return `fallback` as the call's value, with no error.
    Suppress {
        #[serde(default)]
        fallback: Bytes,
    },
    /// Wrap the failure in `Failure::Remapped { label, .. }`.
    Remap { label: String },
}

/// One entry of the failover table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverRule {
    pub on: OutcomeMatch,
    #[serde(flatten)]
    pub action: FailoverAction,
}

impl FailoverRule {
    pub fn propagate(on: OutcomeMatch) -> Self {
        Self {
            on,
            action: FailoverAction::Propagate,
        }
    }

    /// Suppress to an empty value.
    pub fn suppress(on: OutcomeMatch) -> Self {
        Self::suppress_with(on, Bytes::new())
    }

    pub fn suppress_with(on: OutcomeMatch, fallback: impl Into<Bytes>) -> Self {
        Self {
            on,
            action: FailoverAction::Suppress {
                fallback: fallback.into(),
            },
        }
    }

    pub fn remap(on: OutcomeMatch, label: impl Into<String>) -> Self {
        Self {
            on,
            action: FailoverAction::Remap {
                label: label.into(),
            },
        }
    }
}

/// Ordered failover table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailoverRules {
    rules: Vec<FailoverRule>,
}

impl FailoverRules {
    pub fn new(rules: Vec<FailoverRule>) -> Self {
        Self { rules }
    }

    pub fn with(mut self, rule: FailoverRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[FailoverRule] {
        &self.rules
    }

    /// Action for a terminal outcome, `Propagate` when nothing matches.
    pub fn action_for(&self, outcome: &Outcome) -> FailoverAction {
        self.rules
            .iter()
            .find(|rule| rule.on.matches(outcome))
            .map(|rule| rule.action.clone())
            .unwrap_or(FailoverAction::Propagate)
    }

    /// Turn the terminal outcome into the call's result.
    pub fn apply(&self, outcome: Outcome) -> Result<Reply, Failure> {
        let action = self.action_for(&outcome);
        let tag = outcome.tag();

        let failure = match outcome.into_result() {
            Ok(response) => return Ok(Reply::Upstream(response)),
            Err(failure) => failure,
        };

        match action {
            FailoverAction::Propagate => Err(failure),
            FailoverAction::Suppress { fallback } => {
                tracing::info!(outcome = tag.as_str(), error = %failure, "Failure suppressed by failover rule");
                Ok(Reply::Fallback(fallback))
            }
            FailoverAction::Remap { label } => {
                tracing::debug!(outcome = tag.as_str(), label = %label, "Failure remapped by failover rule");
                Err(Failure::Remapped {
                    label,
                    source: Box::new(failure),
                })
            }
        }
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (pool sizes > 0, jitter factor within 0..=1)
//! - Check rule tables for empty labels and inverted ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use tokio::sync::Semaphore;

use crate::config::schema::ClientConfig;
use crate::http::status::StatusMatch;
use crate::observability::logging::is_valid_level;
use crate::resilience::failover::FailoverAction;
use crate::resilience::retries::Backoff;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a whole client configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.pool.max_connections == 0 {
        errors.push(ValidationError::new("pool.max_connections", "must be greater than 0"));
    } else if config.pool.max_connections > Semaphore::MAX_PERMITS {
        errors.push(ValidationError::new(
            "pool.max_connections",
            format!("must be at most {}", Semaphore::MAX_PERMITS),
        ));
    }
    if config.pool.acquire_timeout_ms == 0 {
        errors.push(ValidationError::new("pool.acquire_timeout_ms", "must be greater than 0"));
    }

    match &config.retries.backoff {
        Backoff::FixedDelay { delay_ms: 0, .. } => {
            errors.push(ValidationError::new(
                "retries.delay_ms",
                "must be greater than 0 (use max_attempts for immediate retries)",
            ));
        }
        Backoff::ExponentialBackoff { base_ms: 0, .. }
        | Backoff::ExponentialBackoffJitter { base_ms: 0, .. } => {
            errors.push(ValidationError::new("retries.base_ms", "must be greater than 0"));
        }
        _ => {}
    }
    if let Backoff::ExponentialBackoffJitter { jitter_factor, .. } = &config.retries.backoff {
        if !(0.0..=1.0).contains(jitter_factor) {
            errors.push(ValidationError::new(
                "retries.jitter_factor",
                format!("must be within 0.0..=1.0, got {jitter_factor}"),
            ));
        }
    }
    if config.retries.max_delay_ms == Some(0) {
        errors.push(ValidationError::new("retries.max_delay_ms", "must be greater than 0 when set"));
    }

    for (i, rule) in config.status_rules.iter().enumerate() {
        if rule.label.trim().is_empty() {
            errors.push(ValidationError::new(format!("status_rules[{i}].label"), "must not be empty"));
        }
        if let StatusMatch::Range { from, to } = rule.when {
            if from > to {
                errors.push(ValidationError::new(
                    format!("status_rules[{i}].when"),
                    format!("range {from}..={to} is empty"),
                ));
            }
        }
    }

    for (i, rule) in config.failover.rules().iter().enumerate() {
        if let FailoverAction::Remap { label } = &rule.action {
            if label.trim().is_empty() {
                errors.push(ValidationError::new(format!("failover[{i}].label"), "must not be empty"));
            }
        }
    }

    if !is_valid_level(&config.observability.log_level) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level `{}`", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

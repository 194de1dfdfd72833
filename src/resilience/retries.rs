//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether an attempt's outcome is eligible for another try
//! - Compute the wait before the next attempt (none, fixed, exponential, jittered)
//! - Refuse to resend requests that are not retry-safe
//! - Drive the attempt loop for any async attempt function
//!
//! # State Machine
//! ```text
//! Attempting ──success──────────────────────────▶ Done
//! Attempting ──eligible, tries left──▶ Waiting ──delay──▶ Attempting
//! Attempting ──ineligible or exhausted──────────▶ Exhausted
//! ```
//!
//! # Design Decisions
//! - Connection errors and 5xx are retryable by default, 4xx never by default
//! - Eligibility is a list of outcome matchers, not error-type checks
//! - Attempts within a call are strictly sequential

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http::outcome::{Outcome, OutcomeMatch};
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Shape of the wait between attempts. `max_retries` counts retries, so a
/// call makes at most `max_retries + 1` attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    None,
    MaxAttempts {
        max_retries: u32,
    },
    FixedDelay {
        max_retries: u32,
        delay_ms: u64,
    },
    ExponentialBackoff {
        max_retries: u32,
        base_ms: u64,
    },
    ExponentialBackoffJitter {
        max_retries: u32,
        base_ms: u64,
        jitter_factor: f64,
    },
}

impl Backoff {
    pub fn max_retries(&self) -> u32 {
        match self {
            Backoff::None => 0,
            Backoff::MaxAttempts { max_retries }
            | Backoff::FixedDelay { max_retries, .. }
            | Backoff::ExponentialBackoff { max_retries, .. }
            | Backoff::ExponentialBackoffJitter { max_retries, .. } => *max_retries,
        }
    }

    /// Wait before retry number `retry` (1 for the first retry).
    pub fn delay(&self, retry: u32, max_delay_ms: Option<u64>) -> Duration {
        let delay = match self {
            Backoff::None | Backoff::MaxAttempts { .. } => Duration::ZERO,
            Backoff::FixedDelay { delay_ms, .. } => Duration::from_millis(*delay_ms),
            Backoff::ExponentialBackoff { base_ms, .. } => {
                calculate_backoff(retry, *base_ms, 0.0, None)
            }
            Backoff::ExponentialBackoffJitter {
                base_ms,
                jitter_factor,
                ..
            } => calculate_backoff(retry, *base_ms, *jitter_factor, None),
        };
        match max_delay_ms {
            Some(max) => delay.min(Duration::from_millis(max)),
            None => delay,
        }
    }
}

/// Retry policy for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(flatten)]
    pub backoff: Backoff,

    /// Outcomes that may be retried.
    #[serde(default = "default_retry_on")]
    pub retry_on: Vec<OutcomeMatch>,

    /// Upper bound on any single wait.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

fn default_retry_on() -> Vec<OutcomeMatch> {
    vec![OutcomeMatch::Transport, OutcomeMatch::ServerError]
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Backoff::ExponentialBackoff {
                max_retries: 2,
                base_ms: 100,
            },
            retry_on: default_retry_on(),
            max_delay_ms: Some(2000),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl RetryPolicy {
    fn with_backoff(backoff: Backoff) -> Self {
        Self {
            backoff,
            retry_on: default_retry_on(),
            max_delay_ms: None,
        }
    }

    /// Single attempt, never retried.
    pub fn none() -> Self {
        Self::with_backoff(Backoff::None)
    }

    /// Up to `max_retries` immediate retries.
    pub fn max_attempts(max_retries: u32) -> Self {
        Self::with_backoff(Backoff::MaxAttempts { max_retries })
    }

    pub fn fixed_delay(max_retries: u32, delay: Duration) -> Self {
        Self::with_backoff(Backoff::FixedDelay {
            max_retries,
            delay_ms: millis(delay),
        })
    }

    pub fn exponential(max_retries: u32, base: Duration) -> Self {
        Self::with_backoff(Backoff::ExponentialBackoff {
            max_retries,
            base_ms: millis(base),
        })
    }

    pub fn exponential_jitter(max_retries: u32, base: Duration, jitter_factor: f64) -> Self {
        Self::with_backoff(Backoff::ExponentialBackoffJitter {
            max_retries,
            base_ms: millis(base),
            jitter_factor,
        })
    }

    /// Replace the eligibility list.
    pub fn retry_on(mut self, matchers: Vec<OutcomeMatch>) -> Self {
        self.retry_on = matchers;
        self
    }

    /// Add one matcher to the eligibility list.
    pub fn also_retry(mut self, matcher: OutcomeMatch) -> Self {
        self.retry_on.push(matcher);
        self
    }

    pub fn max_delay(mut self, max: Duration) -> Self {
        self.max_delay_ms = Some(millis(max));
        self
    }

    pub fn is_eligible(&self, outcome: &Outcome) -> bool {
        self.retry_on.iter().any(|m| m.matches(outcome))
    }

    /// Maximum number of attempts a call can make.
    pub fn max_total_attempts(&self) -> u32 {
        self.backoff.max_retries().saturating_add(1)
    }
}

/// Where the retry state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting,
    Waiting(Duration),
    Exhausted,
    Done,
}

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    /// Success; stop.
    Done,
    /// Failure that may not or can no longer be retried.
    Exhausted,
    /// Failure the policy would retry, but the request is not retry-safe.
    NotRetrySafe,
}

/// Retry bookkeeping for one call.
#[derive(Debug)]
pub struct Retrier<'a> {
    policy: &'a RetryPolicy,
    retry_safe: bool,
    attempts: u32,
    state: RetryState,
}

impl<'a> Retrier<'a> {
    pub fn new(policy: &'a RetryPolicy, retry_safe: bool) -> Self {
        Self {
            policy,
            retry_safe,
            attempts: 0,
            state: RetryState::Attempting,
        }
    }

    /// Mark the start of an attempt and return its number (starting at 1).
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.state = RetryState::Attempting;
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn on_outcome(&mut self, outcome: &Outcome) -> RetryDecision {
        if outcome.is_success() {
            self.state = RetryState::Done;
            return RetryDecision::Done;
        }

        if !self.policy.is_eligible(outcome) || self.attempts >= self.policy.max_total_attempts() {
            self.state = RetryState::Exhausted;
            return RetryDecision::Exhausted;
        }

        if !self.retry_safe {
            self.state = RetryState::Exhausted;
            return RetryDecision::NotRetrySafe;
        }

        // The k-th retry follows the k-th attempt.
        let delay = self.policy.backoff.delay(self.attempts, self.policy.max_delay_ms);
        self.state = RetryState::Waiting(delay);
        RetryDecision::Retry { delay }
    }
}

/// How a retry loop ended.
#[derive(Debug)]
pub enum Terminal {
    Done(Outcome),
    Exhausted(Outcome),
    NotRetrySafe(Outcome),
}

/// Terminal outcome plus the number of attempts made.
#[derive(Debug)]
pub struct RetryReport {
    pub terminal: Terminal,
    pub attempts: u32,
}

/// Execute `attempt` until it succeeds, becomes ineligible, or the policy is exhausted.
///
/// `attempt` receives the attempt number, starting at 1.
pub async fn run_with_retry<F, Fut>(policy: &RetryPolicy, retry_safe: bool, mut attempt: F) -> RetryReport
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Outcome>,
{
    let mut retrier = Retrier::new(policy, retry_safe);

    loop {
        let number = retrier.begin_attempt();
        let outcome = attempt(number).await;

        match retrier.on_outcome(&outcome) {
            RetryDecision::Retry { delay } => {
                tracing::info!(
                    attempt = number,
                    outcome = outcome.tag().as_str(),
                    delay = ?delay,
                    "Retrying request"
                );
                metrics::record_retry(outcome.tag());
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            RetryDecision::Done => {
                return RetryReport {
                    terminal: Terminal::Done(outcome),
                    attempts: number,
                };
            }
            RetryDecision::Exhausted => {
                tracing::debug!(
                    attempts = number,
                    outcome = outcome.tag().as_str(),
                    "Retries exhausted"
                );
                return RetryReport {
                    terminal: Terminal::Exhausted(outcome),
                    attempts: number,
                };
            }
            RetryDecision::NotRetrySafe => {
                tracing::warn!(
                    attempt = number,
                    outcome = outcome.tag().as_str(),
                    "Request is not retry-safe, not retrying"
                );
                return RetryReport {
                    terminal: Terminal::NotRetrySafe(outcome),
                    attempts: number,
                };
            }
        }
    }
}

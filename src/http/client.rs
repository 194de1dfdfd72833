//! Client facade.
//!
//! # Data Flow
//! ```text
//! execute / execute_with / execute_until
//!     → call span (call id, method, target)
//!     → run_with_retry, per attempt:
//!         pool.acquire (connect timeout)
//!         → send (response timeout, write-stall guard)
//!         → read_body (read-stall timeout)
//!         → pool.release
//!         → StatusClassifier → Outcome
//!     → failover rules → Reply | Failure
//! ```
//!
//! Shutdown, the caller's cancel future, or dropping the call future abort
//! the in-flight attempt and any pending backoff. The attempt's connection
//! is dropped, which frees its pool slot.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use crate::config::validation::validate_config;
use crate::config::{ClientConfig, PoolConfig, TimeoutConfig};
use crate::error::{ClientResult, Failure, PolicyError, TransportFailure};
use crate::http::outcome::Outcome;
use crate::http::request::{RequestDescriptor, X_REQUEST_ID};
use crate::http::response::{Reply, Response};
use crate::http::status::{StatusClassifier, StatusRule};
use crate::lifecycle::Shutdown;
use crate::net::Connector;
use crate::observability::metrics;
use crate::pool::{ConnectionPool, PoolStats};
use crate::resilience::failover::FailoverRules;
use crate::resilience::retries::{run_with_retry, RetryPolicy, Terminal};
use crate::resilience::timeouts::{read_body, send_failure, within};

/// Everything that governs one call.
#[derive(Debug, Clone, Default)]
pub struct CallPolicy {
    pub timeouts: TimeoutConfig,
    pub classifier: StatusClassifier,
    pub retry: RetryPolicy,
    pub failover: FailoverRules,
}

impl CallPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn status_rules(mut self, rules: Vec<StatusRule>) -> Self {
        self.classifier = StatusClassifier::new(rules);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn failover(mut self, failover: FailoverRules) -> Self {
        self.failover = failover;
        self
    }
}

#[derive(Debug)]
struct ClientInner {
    pool: ConnectionPool,
    shutdown: Shutdown,
    defaults: CallPolicy,
}

/// Resilient HTTP client. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a client. The pool starts empty and fills per endpoint on first use.
    ///
    /// Fails with [`Failure::InvalidConfig`] listing every invalid field.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        validate_config(&config).map_err(Failure::InvalidConfig)?;
        let connector = Connector::new()?;
        let defaults = CallPolicy {
            timeouts: config.timeouts,
            classifier: StatusClassifier::new(config.status_rules),
            retry: config.retries,
            failover: config.failover,
        };

        tracing::debug!(
            max_connections = config.pool.max_connections,
            max_idle_ms = config.pool.max_idle_ms,
            max_lifetime_ms = config.pool.max_lifetime_ms,
            "Client created"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                pool: ConnectionPool::new(config.pool, connector),
                shutdown: Shutdown::new(),
                defaults,
            }),
        })
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// The policy used by [`Client::call`] and for status rules in [`Client::execute`].
    pub fn default_policy(&self) -> &CallPolicy {
        &self.inner.defaults
    }

    /// Run a call with the client's default policies.
    pub async fn call(&self, request: &RequestDescriptor) -> ClientResult<Reply> {
        self.execute_with(request, &self.inner.defaults).await
    }

    /// Run a call with explicit timeouts, retry and failover, using the client's status rules.
    pub async fn execute(
        &self,
        request: &RequestDescriptor,
        timeouts: TimeoutConfig,
        retry: RetryPolicy,
        failover: FailoverRules,
    ) -> ClientResult<Reply> {
        let policy = CallPolicy {
            timeouts,
            classifier: self.inner.defaults.classifier.clone(),
            retry,
            failover,
        };
        self.execute_with(request, &policy).await
    }

    pub async fn execute_with(
        &self,
        request: &RequestDescriptor,
        policy: &CallPolicy,
    ) -> ClientResult<Reply> {
        self.execute_until(request, policy, std::future::pending::<()>()).await
    }

    /// Run a call that is abandoned with `Failure::Cancelled` once `cancel` resolves.
    pub async fn execute_until<C>(
        &self,
        request: &RequestDescriptor,
        policy: &CallPolicy,
        cancel: C,
    ) -> ClientResult<Reply>
    where
        C: Future<Output = ()>,
    {
        let call_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let span = tracing::info_span!(
            "call",
            call_id = %call_id,
            method = %request.method(),
            target = %request.url(),
        );

        let start = Instant::now();
        let mut shutdown = self.inner.shutdown.subscribe();

        let result = async {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Call cancelled by client shutdown");
                    Err(Failure::Cancelled)
                }
                _ = cancel => {
                    tracing::info!("Call cancelled by caller");
                    Err(Failure::Cancelled)
                }
                result = self.run(request, policy, &call_id) => result,
            }
        }
        .instrument(span)
        .await;

        metrics::record_call(result_label(&result), start);
        result
    }

    async fn run(
        &self,
        request: &RequestDescriptor,
        policy: &CallPolicy,
        call_id: &str,
    ) -> ClientResult<Reply> {
        // Fail fast on requests that can never be rendered.
        request.to_http(call_id)?;

        let report = run_with_retry(&policy.retry, request.is_retry_safe(), |number| {
            self.attempt(request, policy, call_id, number)
        })
        .await;

        let result = match report.terminal {
            Terminal::Done(outcome) | Terminal::Exhausted(outcome) => policy.failover.apply(outcome),
            Terminal::NotRetrySafe(outcome) => match outcome.into_result() {
                Ok(response) => Ok(Reply::Upstream(response)),
                Err(cause) => Err(PolicyError::NotRetrySafe {
                    method: request.method().clone(),
                    cause: Box::new(cause),
                }
                .into()),
            },
        };

        match &result {
            Ok(reply) => tracing::info!(
                attempts = report.attempts,
                status = ?reply.status(),
                fallback = reply.is_fallback(),
                "Call succeeded"
            ),
            Err(e) => tracing::warn!(attempts = report.attempts, error = %e, "Call failed"),
        }
        result
    }

    async fn attempt(
        &self,
        request: &RequestDescriptor,
        policy: &CallPolicy,
        call_id: &str,
        number: u32,
    ) -> Outcome {
        let outcome = match self.exchange(request, &policy.timeouts, call_id).await {
            Ok(response) => policy.classifier.classify(response),
            Err(failure) => Outcome::TransportFailure(failure),
        };

        match &outcome {
            Outcome::TransportFailure(failure) => tracing::debug!(
                attempt = number,
                outcome = outcome.tag().as_str(),
                error = %failure,
                "Attempt finished"
            ),
            _ => tracing::debug!(attempt = number, outcome = outcome.tag().as_str(), "Attempt finished"),
        }
        metrics::record_attempt(outcome.tag());
        outcome
    }

    /// One request/response exchange on a pooled connection.
    async fn exchange(
        &self,
        request: &RequestDescriptor,
        timeouts: &TimeoutConfig,
        call_id: &str,
    ) -> Result<Response, TransportFailure> {
        let pool = &self.inner.pool;
        let mut conn = pool.acquire(request.endpoint(), timeouts.connect()).await?;
        conn.set_write_stall(timeouts.write_stall());

        let http_request = request
            .to_http(call_id)
            .map_err(|e| TransportFailure::Connection(e.to_string()))?;

        let sender = conn.sender();
        let response = within(
            timeouts.response(),
            async move {
                sender.ready().await.map_err(send_failure)?;
                sender.send_request(http_request).await.map_err(send_failure)
            },
            |after| TransportFailure::ResponseTimeout { after },
        )
        .await?;

        let (parts, body) = response.into_parts();
        let body = read_body(body, timeouts.read_stall()).await?;
        pool.release(conn);

        Ok(Response::new(parts.status, parts.headers, body))
    }

    /// Idle and in-use connection counts for the request's endpoint.
    pub fn pool_stats(&self, request: &RequestDescriptor) -> PoolStats {
        self.inner.pool.stats(request.endpoint())
    }

    /// Close idle connections past their limits.
    pub fn evict_idle(&self) -> usize {
        self.inner.pool.evict()
    }

    /// Cancel in-flight calls and close the pool. Later calls fail immediately.
    pub fn shutdown(&self) {
        tracing::info!(in_flight = self.inner.shutdown.receiver_count(), "Client shutting down");
        self.inner.shutdown.trigger();
        self.inner.pool.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_triggered()
    }
}

fn result_label(result: &ClientResult<Reply>) -> &'static str {
    match result {
        Ok(Reply::Upstream(_)) => "success",
        Ok(Reply::Fallback(_)) => "fallback",
        Err(Failure::Transport(_)) => "transport",
        Err(Failure::ClientError { .. }) => "client_error",
        Err(Failure::ServerError { .. }) => "server_error",
        Err(Failure::Flagged { .. }) => "flagged",
        Err(Failure::Policy(_)) => "policy",
        Err(Failure::Remapped { .. }) => "remapped",
        Err(Failure::Cancelled) => "cancelled",
        Err(Failure::InvalidRequest(_)) => "invalid_request",
        Err(Failure::InvalidConfig(_)) => "invalid_config",
    }
}

/// Builder for [`Client`], starting from the default configuration.
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retries = retry;
        self
    }

    pub fn status_rules(mut self, rules: Vec<StatusRule>) -> Self {
        self.config.status_rules = rules;
        self
    }

    pub fn failover(mut self, failover: FailoverRules) -> Self {
        self.config.failover = failover;
        self
    }

    pub fn build(self) -> ClientResult<Client> {
        Client::new(self.config)
    }
}

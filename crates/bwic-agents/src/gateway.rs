use std::time::Duration;

use async_trait::async_trait;
use bwic_models::config::RetryConfig;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::prompts::ModelRequest;

/// A text-generation backend. Mockable for testing.
///
/// Implementations return the model's text verbatim and classify their own
/// failures: `Transient`/`Timeout` for anything worth retrying, `Fatal` for
/// rejected credentials or requests.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// The model identifier, for logs.
    fn name(&self) -> &str;

    async fn invoke(&self, request: &ModelRequest) -> Result<String, AgentError>;
}

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig, attempt_timeout: Option<Duration>) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            attempt_timeout,
        }
    }

    /// A single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            attempt_timeout: None,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default(), None)
    }
}

/// Invoke `gateway`, retrying transient failures with doubling backoff.
///
/// Cancelling `cancel` abandons the in-flight attempt (or the backoff sleep)
/// and returns [`AgentError::Cancelled`].
pub async fn invoke_with_retry(
    gateway: &dyn ModelGateway,
    request: &ModelRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String, AgentError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(model = gateway.name(), attempt, "Invoking model");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            result = attempt_once(gateway, request, policy.attempt_timeout) => result,
        };

        let err = match result {
            Ok(text) => return Ok(text),
            Err(err) => err,
        };

        if !err.is_retryable() || attempt >= max_attempts {
            warn!(
                model = gateway.name(),
                attempt,
                max_attempts,
                error = %err,
                "Model call failed"
            );
            return Err(err);
        }

        warn!(
            model = gateway.name(),
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient model failure, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            _ = sleep(delay) => {}
        }
        delay = (delay * 2).min(policy.max_backoff);
    }
}

async fn attempt_once(
    gateway: &dyn ModelGateway,
    request: &ModelRequest,
    timeout: Option<Duration>,
) -> Result<String, AgentError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, gateway.invoke(request))
            .await
            .map_err(|_| AgentError::Timeout(limit))?,
        None => gateway.invoke(request).await,
    }
}

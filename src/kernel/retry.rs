//! Bounded retry with exponential backoff for remote API calls.
//!
//! Every call against the catalog Admin API goes through
//! [`retry_with_backoff`]. Failures are classified by message vocabulary:
//! timeouts, rate limits, throttling and "busy" responses are retryable,
//! everything else is terminal and propagates immediately. "Already exists"
//! style conflicts are not errors at all - call sites detect them with
//! [`is_idempotent_message`] and treat the operation as a no-op success.
//!
//! Delays follow `min(initial * 2^(attempt-1), max)`. An optional per-attempt
//! timeout races the operation against a deadline, independent of whatever
//! timeout the remote side enforces.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{debug, error, warn};

/// Outcome of classifying a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient - worth another attempt after backoff.
    Retryable,
    /// Permanent - propagate without further attempts.
    Terminal,
}

/// Classify an error by its message vocabulary.
pub fn classify(err: &anyhow::Error) -> ErrorClass {
    if is_retryable_message(&format!("{err:#}")) {
        ErrorClass::Retryable
    } else {
        ErrorClass::Terminal
    }
}

/// Transient-failure vocabulary used by the remote API.
pub fn is_retryable_message(message: &str) -> bool {
    let message = message.to_lowercase();
    ["timeout", "timed out", "throttl", "rate limit", "rate-limit", "busy"]
        .iter()
        .any(|kw| message.contains(kw))
}

/// "Already exists" style responses are idempotent no-ops, not failures.
pub fn is_idempotent_message(message: &str) -> bool {
    let message = message.to_lowercase();
    ["already exists", "duplicate", "taken"]
        .iter()
        .any(|kw| message.contains(kw))
}

/// Retry schedule for a remote operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Client-side deadline per attempt, raced against the call itself.
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            timeout: None,
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            timeout: None,
        }
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(16);
        let delay = self.initial_delay.saturating_mul(1 << shift);
        delay.min(self.max_delay)
    }
}

/// Execute `op`, retrying retryable failures per `policy`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_sleeper(policy, op_name, &mut op, tokio::time::sleep).await
}

/// Like [`retry_with_backoff`] but with an injectable sleep, so tests can
/// record the exact delay sequence without waiting.
pub async fn retry_with_sleeper<T, F, Fut, S, SFut>(
    policy: &RetryPolicy,
    op_name: &str,
    op: &mut F,
    mut sleep: S,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    S: FnMut(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let result = match policy.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, op()).await {
                Ok(result) => result,
                Err(_) => Err(anyhow!("{op_name} timed out after {deadline:?}")),
            },
            None => op().await,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) => {
                let class = classify(&err);
                if class == ErrorClass::Terminal || attempt >= policy.max_attempts {
                    error!(
                        operation = op_name,
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %err,
                        "Operation failed, not retrying"
                    );
                    return Err(err.context(format!("{op_name} failed after {attempt} attempt(s)")));
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    operation = op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retryable failure, backing off"
                );
                debug!(operation = op_name, "Sleeping before retry");
                sleep(delay).await;
            }
        }
    }
}

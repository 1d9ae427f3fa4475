//! Centralized retry/backoff policy
//!
//! One policy object is injected into every component that calls out of
//! process. Delays grow exponentially from a base, are capped, and carry
//! random jitter so scheduled runs across deployments do not retry in step.

use rand::Rng;
use std::fmt::Display;
use std::time::Duration;

/// Classifies an error as worth retrying or not
pub trait Retryable {
    /// Transient errors (network, rate limit, upstream 5xx) retry; fatal
    /// errors (auth, malformed request) fail immediately.
    fn is_transient(&self) -> bool;
}

/// Bounded exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Delay before the given retry (attempt is 1-based; attempt 1 has no delay)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);

        // Up to 25% jitter on top of the computed delay
        let jitter_ms = if delay.as_millis() > 0 {
            rand::thread_rng().gen_range(0..=(delay.as_millis() as u64 / 4))
        } else {
            0
        };
        delay + Duration::from_millis(jitter_ms)
    }

    /// Run an operation, retrying transient failures up to max_attempts
    pub async fn retry<T, E, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient error, will retry after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if err.is_transient() {
                        tracing::error!(
                            operation = operation_name,
                            attempt,
                            error = %err,
                            "Retries exhausted"
                        );
                    } else {
                        tracing::error!(
                            operation = operation_name,
                            error = %err,
                            "Fatal error, not retrying"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

//! In-process stand-in for the durable-execution collaborator: task
//! invocation with retry and durable sleep.

use std::future::Future;
use std::time::Duration;

use crate::error::TaskFailure;

/// Retry policy applied to a task invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_coefficient: f64,
    /// Upper bound for the delay between retries.
    pub maximum_interval: Duration,
    /// Maximum number of attempts; `None` retries until success.
    pub maximum_attempts: Option<u32>,
    /// Bound for a single attempt. Expiry counts as a retryable failure.
    pub start_to_close_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(30),
            maximum_attempts: None,
            start_to_close_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Policy used for compensations: same backoff, longer attempt bound.
    pub fn compensation() -> Self {
        Self {
            start_to_close_timeout: Duration::from_secs(10),
            ..Self::default()
        }
    }

    pub fn with_maximum_attempts(mut self, attempts: u32) -> Self {
        self.maximum_attempts = Some(attempts);
        self
    }

    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = timeout;
        self
    }

    /// Delay after the given failed attempt (1-based), capped at `maximum_interval`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        let cap = self.maximum_interval.as_secs_f64();
        if !secs.is_finite() || secs >= cap {
            self.maximum_interval
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    fn is_exhausted(&self, attempt: u32) -> bool {
        self.maximum_attempts.is_some_and(|max| attempt >= max)
    }
}

/// Invokes tasks with at-least-once semantics.
///
/// Each attempt receives its 1-based attempt number. Retryable failures are
/// retried with exponential backoff until the policy is exhausted;
/// non-retryable failures surface immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskExecutor;

impl TaskExecutor {
    pub fn new() -> Self {
        Self
    }

    #[tracing::instrument(skip(self, policy, attempt_fn))]
    pub async fn execute<T, F, Fut>(
        &self,
        task: &str,
        policy: &RetryPolicy,
        mut attempt_fn: F,
    ) -> Result<T, TaskFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TaskFailure>>,
    {
        let mut attempt = 1;
        loop {
            let outcome =
                match tokio::time::timeout(policy.start_to_close_timeout, attempt_fn(attempt)).await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(TaskFailure::timed_out(task, policy.start_to_close_timeout)),
                };

            let failure = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "task succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            if !failure.retryable {
                tracing::warn!(attempt, error = %failure, "task failed, not retryable");
                return Err(failure);
            }
            if policy.is_exhausted(attempt) {
                tracing::warn!(attempt, error = %failure, "task failed, retries exhausted");
                return Err(failure);
            }

            let delay = policy.backoff_for(attempt);
            tracing::info!(attempt, ?delay, error = %failure, "task attempt failed, retrying");
            metrics::counter!("saga_task_retries_total").increment(1);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Durable sleep stand-in. A zero duration returns immediately.
pub async fn durable_sleep(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

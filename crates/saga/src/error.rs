//! Saga error types.

use std::time::Duration;

use common::ModelError;
use thiserror::Error;

/// A failure reported by an invoked task.
///
/// The `retryable` flag is the only classification the saga relies on:
/// retryable failures are retried by the [`TaskExecutor`](crate::runtime::TaskExecutor)
/// up to the policy limits, non-retryable ones surface on the first attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task '{task}' failed: {message}")]
pub struct TaskFailure {
    /// Name of the task that failed.
    pub task: String,
    /// Human-readable failure message.
    pub message: String,
    /// Optional application failure type, e.g. `InvalidCreditCard`.
    pub failure_type: Option<String>,
    /// Whether the collaborator may retry the task.
    pub retryable: bool,
}

impl TaskFailure {
    /// A transient failure that may be retried.
    pub fn retryable(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            message: message.into(),
            failure_type: None,
            retryable: true,
        }
    }

    /// A business failure that must never be retried.
    pub fn non_retryable(
        task: impl Into<String>,
        failure_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task: task.into(),
            message: message.into(),
            failure_type: Some(failure_type.into()),
            retryable: false,
        }
    }

    /// An attempt that exceeded its start-to-close timeout.
    pub fn timed_out(task: impl Into<String>, timeout: Duration) -> Self {
        Self {
            task: task.into(),
            message: format!("attempt exceeded start-to-close timeout of {timeout:?}"),
            failure_type: Some("StartToCloseTimeout".to_string()),
            retryable: true,
        }
    }
}

/// Errors that can occur during saga operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    /// A proposed delivery address failed validation.
    #[error("invalid address '{address}': address must start with a digit")]
    InvalidAddress { address: String },

    /// An invoked task failed.
    #[error(transparent)]
    Task(#[from] TaskFailure),

    /// Deliberate defect injected by the `RecoverableFailure` scenario.
    #[error("Simulated bug - fix me!")]
    SimulatedFault,

    /// A step failed after something was committed; compensations have run.
    #[error("saga aborted after {compensations} compensation(s): {source}")]
    Aborted {
        #[source]
        source: Box<SagaError>,
        compensations: usize,
    },

    /// A child run ended without producing a result.
    #[error("child run '{id}' terminated: {reason}")]
    ChildTerminated { id: String, reason: String },

    /// A remote operation could not be started or did not complete.
    #[error("remote operation '{operation}' on endpoint '{endpoint}' failed: {reason}")]
    RemoteOperation {
        endpoint: String,
        operation: String,
        reason: String,
    },

    /// No handler is registered for the message name.
    #[error("unknown {kind} '{name}'")]
    UnknownMessage { kind: &'static str, name: String },

    /// A message payload could not be decoded.
    #[error("invalid payload for '{name}': {reason}")]
    InvalidPayload { name: String, reason: String },

    /// The scenario name does not map to a run variant.
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    /// No run is registered under the given id.
    #[error("run not found: {0}")]
    RunNotFound(String),

    /// The run has closed and no longer accepts messages.
    #[error("run '{0}' is closed")]
    RunClosed(String),

    /// The order input itself is malformed.
    #[error("invalid order: {0}")]
    Model(#[from] ModelError),
}

impl SagaError {
    /// Returns the triggering failure, looking through [`SagaError::Aborted`].
    pub fn root_cause(&self) -> &SagaError {
        match self {
            SagaError::Aborted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns true for failures rejected at the boundary without state change.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            SagaError::InvalidAddress { .. }
                | SagaError::InvalidPayload { .. }
                | SagaError::UnknownScenario(_)
                | SagaError::Model(_)
        )
    }

    /// Returns true if the root cause is a retryable task failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self.root_cause(), SagaError::Task(failure) if failure.retryable)
    }
}

//! Run lifecycle state.

use serde::{Deserialize, Serialize};

/// The lifecycle state of an order-fulfillment run.
///
/// State transitions:
/// ```text
/// NotStarted ──► Running ──┬──► AwaitingAddress ──► Shipping ──► Completed
///                          ├──► Shipping ──┬──► Completed
///                          │               └──► Failed
///                          ├──► Compensating ──► Failed
///                          └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Run has not started yet.
    #[default]
    NotStarted,

    /// Steps before the shipment fan-out are executing.
    Running,

    /// Blocked in the bounded address-correction window.
    AwaitingAddress,

    /// Shipment handles have been started and are being joined.
    Shipping,

    /// A committed step failed and compensations are in progress.
    Compensating,

    /// The run produced an output (terminal state).
    Completed,

    /// The run ended with a failure (terminal state).
    Failed,
}

impl SagaState {
    /// Returns true if the run can still begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaState::Running)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running => "Running",
            SagaState::AwaitingAddress => "AwaitingAddress",
            SagaState::Shipping => "Shipping",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//! Run-scoped context and the external handle of a run.
//!
//! The handle exposes a message table keyed by name:
//!
//! | kind   | name          | payload              | reply                         |
//! |--------|---------------|----------------------|-------------------------------|
//! | query  | `getProgress` | none                 | percentage                    |
//! | query  | `OrderStatus` | none                 | status label or `null`        |
//! | signal | `UpdateOrder` | `{"address": "..."}` | none                          |
//! | update | `UpdateOrder` | `{"address": "..."}` | `"Updated address: ..."`      |

use std::sync::Arc;

use common::{OrderInput, OrderOutput, UpdateOrderInput};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::watch;

use crate::error::SagaError;
use crate::gate::AddressUpdateGate;
use crate::order_fulfillment::{
    MESSAGE_UPDATE_ORDER, ORDER_STATUS_KEY, QUERY_GET_PROGRESS, QUERY_ORDER_STATUS,
};
use crate::progress::{Milestone, ProgressSnapshot, ProgressTracker};
use crate::state::SagaState;
use crate::variant::SagaRunVariant;

/// Terminal outcome of a run.
pub type RunOutcome = Result<OrderOutput, SagaError>;

/// State owned by exactly one run.
pub(crate) struct RunContext {
    run_id: String,
    order_id: String,
    variant: SagaRunVariant,
    progress: Arc<ProgressTracker>,
    gate: Arc<AddressUpdateGate>,
    state: watch::Sender<SagaState>,
    outcome: watch::Sender<Option<RunOutcome>>,
}

impl RunContext {
    pub(crate) fn new(input: &OrderInput, variant: SagaRunVariant) -> Self {
        Self {
            run_id: input.run_id(),
            order_id: input.order_id.clone(),
            variant,
            progress: Arc::new(ProgressTracker::new(variant.projects_status())),
            gate: Arc::new(AddressUpdateGate::new()),
            state: watch::Sender::new(SagaState::NotStarted),
            outcome: watch::Sender::new(None),
        }
    }

    pub(crate) fn handle(&self) -> OrderHandle {
        OrderHandle {
            run_id: self.run_id.clone(),
            order_id: self.order_id.clone(),
            variant: self.variant,
            progress: self.progress.clone(),
            gate: self.gate.clone(),
            state: self.state.subscribe(),
            outcome: self.outcome.subscribe(),
        }
    }

    pub(crate) fn run_id(&self) -> &str {
        &self.run_id
    }

    pub(crate) fn variant(&self) -> SagaRunVariant {
        self.variant
    }

    pub(crate) fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub(crate) fn gate(&self) -> &AddressUpdateGate {
        &self.gate
    }

    pub(crate) fn state(&self) -> SagaState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, state: SagaState) {
        self.state.send_replace(state);
    }

    /// Records the terminal outcome. Later calls are ignored.
    pub(crate) fn finish(&self, outcome: RunOutcome) {
        if self.outcome.borrow().is_some() {
            return;
        }
        self.set_state(if outcome.is_ok() {
            SagaState::Completed
        } else {
            SagaState::Failed
        });
        self.outcome.send_replace(Some(outcome));
    }
}

/// External face of a run: queries, signals, updates and the outcome.
///
/// Cheap to clone; every clone observes the same run.
#[derive(Debug, Clone)]
pub struct OrderHandle {
    run_id: String,
    order_id: String,
    variant: SagaRunVariant,
    progress: Arc<ProgressTracker>,
    gate: Arc<AddressUpdateGate>,
    state: watch::Receiver<SagaState>,
    outcome: watch::Receiver<Option<RunOutcome>>,
}

impl OrderHandle {
    /// Run id, `order-<orderId>`.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn variant(&self) -> SagaRunVariant {
        self.variant
    }

    pub fn state(&self) -> SagaState {
        *self.state.borrow()
    }

    pub fn progress(&self) -> u8 {
        self.progress.progress()
    }

    pub fn status(&self) -> Option<String> {
        self.progress.status()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Milestones reached so far, in order.
    pub fn milestones(&self) -> Vec<Milestone> {
        self.progress.history()
    }

    /// Runs a named query. Queries never mutate the run.
    pub fn query(&self, name: &str) -> Result<Value, SagaError> {
        match name {
            QUERY_GET_PROGRESS => Ok(json!(self.progress())),
            QUERY_ORDER_STATUS => Ok(json!(self.progress.search_attribute(ORDER_STATUS_KEY))),
            _ => Err(SagaError::UnknownMessage {
                kind: "query",
                name: name.to_string(),
            }),
        }
    }

    /// Delivers a named signal. An invalid address is dropped, not reported.
    pub fn signal(&self, name: &str, payload: Value) -> Result<(), SagaError> {
        match name {
            MESSAGE_UPDATE_ORDER => {
                let update: UpdateOrderInput = decode(name, payload)?;
                self.ensure_open()?;
                self.gate.propose(&update.address);
                Ok(())
            }
            _ => Err(SagaError::UnknownMessage {
                kind: "signal",
                name: name.to_string(),
            }),
        }
    }

    /// Delivers a named update and returns its acknowledgement.
    ///
    /// The validator runs before any state change; a rejection leaves the run
    /// untouched.
    pub fn update(&self, name: &str, payload: Value) -> Result<String, SagaError> {
        match name {
            MESSAGE_UPDATE_ORDER => {
                let update: UpdateOrderInput = decode(name, payload)?;
                self.ensure_open()?;
                self.gate.propose_and_acknowledge(&update.address)
            }
            _ => Err(SagaError::UnknownMessage {
                kind: "update",
                name: name.to_string(),
            }),
        }
    }

    /// Sends the `UpdateOrder` signal.
    pub fn signal_address(&self, address: &str) -> Result<(), SagaError> {
        self.signal(MESSAGE_UPDATE_ORDER, json!({ "address": address }))
    }

    /// Sends the `UpdateOrder` update.
    pub fn update_address(&self, address: &str) -> Result<String, SagaError> {
        self.update(MESSAGE_UPDATE_ORDER, json!({ "address": address }))
    }

    /// The terminal outcome, if the run has finished.
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome.borrow().clone()
    }

    /// Waits for the run to finish and returns its outcome.
    pub async fn result(&self) -> RunOutcome {
        if let Some(outcome) = self.outcome() {
            return outcome;
        }
        let mut rx = self.outcome.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(SagaError::RunClosed(self.run_id.clone())))
    }

    /// Waits until the run enters `state`. Returns false if the run closed first.
    pub async fn wait_for_state(&self, state: SagaState) -> bool {
        let mut rx = self.state.clone();
        match rx
            .wait_for(|current| *current == state || current.is_terminal())
            .await
        {
            Ok(current) => *current == state,
            Err(_) => false,
        }
    }

    fn ensure_open(&self) -> Result<(), SagaError> {
        if self.state().is_terminal() {
            return Err(SagaError::RunClosed(self.run_id.clone()));
        }
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(name: &str, payload: Value) -> Result<T, SagaError> {
    serde_json::from_value(payload).map_err(|err| SagaError::InvalidPayload {
        name: name.to_string(),
        reason: err.to_string(),
    })
}

//! Order task trait and the simulated implementation standing in for the
//! real payment, inventory and shipping APIs.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderInput, OrderItem, ShippingInput};
use rand::Rng;

use crate::error::TaskFailure;
use crate::order_fulfillment::{
    FAILURE_INVALID_CREDIT_CARD, TASK_CHARGE_CUSTOMER, TASK_CHECK_FRAUD, TASK_GET_ITEMS,
    TASK_PREPARE_SHIPMENT, TASK_SHIP_ORDER, TASK_UNDO_CHARGE_CUSTOMER, TASK_UNDO_PREPARE_SHIPMENT,
};
use crate::runtime::durable_sleep;
use crate::variant::SagaRunVariant;

/// Result of an undo task.
///
/// Undo tasks are registered before their forward step runs, so they must
/// tolerate a forward step that never committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The committed effect was reverted.
    Reverted,
    /// The forward step never committed; nothing was changed.
    NothingToUndo,
}

/// Tasks invoked by the order saga.
#[async_trait]
pub trait OrderActivities: Send + Sync + 'static {
    /// Fetches the line items of the order.
    async fn get_items(&self) -> Result<Vec<OrderItem>, TaskFailure>;

    /// Runs the fraud check. A failure rejects the order.
    async fn check_fraud(&self, input: &OrderInput) -> Result<String, TaskFailure>;

    /// Prepares the shipment.
    async fn prepare_shipment(&self, input: &OrderInput) -> Result<String, TaskFailure>;

    /// Charges the customer. `attempt` is the 1-based attempt number.
    async fn charge_customer(
        &self,
        input: &OrderInput,
        variant: SagaRunVariant,
        attempt: u32,
    ) -> Result<String, TaskFailure>;

    /// Ships a single item.
    async fn ship_order(&self, input: &ShippingInput) -> Result<(), TaskFailure>;

    /// Reverts [`OrderActivities::prepare_shipment`].
    async fn undo_prepare_shipment(&self, input: &OrderInput) -> Result<UndoOutcome, TaskFailure>;

    /// Reverts [`OrderActivities::charge_customer`].
    async fn undo_charge_customer(&self, input: &OrderInput) -> Result<UndoOutcome, TaskFailure>;
}

/// How an injected fault fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// Retryable failure on every attempt.
    Transient,
    /// Non-retryable failure.
    Permanent,
}

impl FaultMode {
    fn failure(&self, task: &str, failure_type: &str, message: &str) -> TaskFailure {
        match self {
            FaultMode::Transient => TaskFailure::retryable(task, message),
            FaultMode::Permanent => TaskFailure::non_retryable(task, failure_type, message),
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    get_items: Option<FaultMode>,
    reject_fraud: bool,
    prepare: Option<FaultMode>,
    charge: Option<FaultMode>,
    ship_item: Option<(i64, FaultMode)>,
    ship_item_once: bool,
    undo_prepare: bool,
}

#[derive(Debug, Default)]
struct SimulatedState {
    calls: Vec<String>,
    prepared: HashSet<String>,
    charged: HashSet<String>,
    shipped: HashMap<String, u32>,
    faults: Faults,
}

/// Simulated order tasks with configurable latency and fault switches.
///
/// Every invocation is recorded so callers can observe call order. Effects
/// (prepared shipments, charges, shipped items) are tracked per order so
/// undo tasks can tell whether their forward step committed.
#[derive(Debug, Clone, Default)]
pub struct SimulatedOrderActivities {
    state: Arc<Mutex<SimulatedState>>,
    latency: Duration,
}

impl SimulatedOrderActivities {
    /// Creates simulated tasks where each external call takes roughly `latency`.
    pub fn new(latency: Duration) -> Self {
        Self {
            state: Arc::default(),
            latency,
        }
    }

    /// Creates simulated tasks that complete without delay.
    pub fn instant() -> Self {
        Self::default()
    }

    /// The catalog returned by [`OrderActivities::get_items`].
    pub fn catalog() -> Vec<OrderItem> {
        vec![
            OrderItem {
                id: 654300,
                description: "Table Top".to_string(),
                quantity: 1,
            },
            OrderItem {
                id: 654321,
                description: "Table Legs".to_string(),
                quantity: 2,
            },
            OrderItem {
                id: 654322,
                description: "Keypad".to_string(),
                quantity: 1,
            },
        ]
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, task: &str) {
        self.lock().calls.push(task.to_string());
    }

    /// Makes `get_items` fail.
    pub fn fail_get_items(&self, mode: FaultMode) {
        self.lock().faults.get_items = Some(mode);
    }

    /// Makes the fraud check reject every order.
    pub fn reject_fraud(&self) {
        self.lock().faults.reject_fraud = true;
    }

    /// Makes `prepare_shipment` fail before committing.
    pub fn fail_prepare(&self, mode: FaultMode) {
        self.lock().faults.prepare = Some(mode);
    }

    /// Makes `charge_customer` fail before committing.
    pub fn fail_charge(&self, mode: FaultMode) {
        self.lock().faults.charge = Some(mode);
    }

    /// Makes shipping of the given item fail.
    pub fn fail_ship_item(&self, item_id: i64, mode: FaultMode) {
        let mut state = self.lock();
        state.faults.ship_item = Some((item_id, mode));
        state.faults.ship_item_once = false;
    }

    /// Makes the next shipping attempt of the given item fail.
    pub fn fail_ship_item_once(&self, item_id: i64, mode: FaultMode) {
        let mut state = self.lock();
        state.faults.ship_item = Some((item_id, mode));
        state.faults.ship_item_once = true;
    }

    /// Makes `undo_prepare_shipment` fail permanently.
    pub fn fail_undo_prepare(&self) {
        self.lock().faults.undo_prepare = true;
    }

    /// Task names in invocation order, one entry per attempt.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of invocations of the given task.
    pub fn call_count(&self, task: &str) -> usize {
        self.lock().calls.iter().filter(|call| *call == task).count()
    }

    /// Returns true if a shipment is currently prepared for the order.
    pub fn is_prepared(&self, order_id: &str) -> bool {
        self.lock().prepared.contains(order_id)
    }

    /// Returns true if the customer is currently charged for the order.
    pub fn is_charged(&self, order_id: &str) -> bool {
        self.lock().charged.contains(order_id)
    }

    /// Number of times the shipment with the given id was shipped.
    pub fn shipped_count(&self, shipment_id: &str) -> u32 {
        self.lock().shipped.get(shipment_id).copied().unwrap_or(0)
    }

    /// Total number of items shipped.
    pub fn total_shipped(&self) -> u32 {
        self.lock().shipped.values().sum()
    }

    fn scaled(&self, factor: f64) -> Duration {
        self.latency.mul_f64(factor)
    }
}

#[async_trait]
impl OrderActivities for SimulatedOrderActivities {
    async fn get_items(&self) -> Result<Vec<OrderItem>, TaskFailure> {
        tracing::info!("getting list of items");
        self.record(TASK_GET_ITEMS);
        durable_sleep(self.scaled(0.1)).await;

        if let Some(mode) = self.lock().faults.get_items {
            return Err(mode.failure(TASK_GET_ITEMS, "CatalogUnavailable", "catalog unavailable"));
        }
        Ok(Self::catalog())
    }

    async fn check_fraud(&self, input: &OrderInput) -> Result<String, TaskFailure> {
        tracing::info!(order_id = %input.order_id, "check fraud task started");
        self.record(TASK_CHECK_FRAUD);
        durable_sleep(self.latency).await;

        if self.lock().faults.reject_fraud {
            return Err(TaskFailure::non_retryable(
                TASK_CHECK_FRAUD,
                "FraudDetected",
                "order rejected by fraud check",
            ));
        }
        Ok(input.order_id.clone())
    }

    async fn prepare_shipment(&self, input: &OrderInput) -> Result<String, TaskFailure> {
        tracing::info!(order_id = %input.order_id, "prepare shipment task started");
        self.record(TASK_PREPARE_SHIPMENT);
        durable_sleep(self.latency).await;

        let mut state = self.lock();
        if let Some(mode) = state.faults.prepare {
            return Err(mode.failure(
                TASK_PREPARE_SHIPMENT,
                "ShipmentRejected",
                "prepare shipment failed",
            ));
        }
        state.prepared.insert(input.order_id.clone());
        Ok(input.order_id.clone())
    }

    async fn charge_customer(
        &self,
        input: &OrderInput,
        variant: SagaRunVariant,
        attempt: u32,
    ) -> Result<String, TaskFailure> {
        tracing::info!(order_id = %input.order_id, attempt, "charge customer task started");
        self.record(TASK_CHARGE_CUSTOMER);
        durable_sleep(self.latency / attempt.max(1)).await;

        let mut state = self.lock();
        match variant {
            SagaRunVariant::ApiFailure if attempt < 5 => {
                tracing::info!(attempt, "charge customer API unavailable");
                return Err(TaskFailure::retryable(
                    TASK_CHARGE_CUSTOMER,
                    "charge customer task failed, API unavailable",
                ));
            }
            SagaRunVariant::NonRecoverableFailure => {
                return Err(TaskFailure::non_retryable(
                    TASK_CHARGE_CUSTOMER,
                    FAILURE_INVALID_CREDIT_CARD,
                    "charge customer task failed, card is invalid",
                ));
            }
            _ => {}
        }
        if let Some(mode) = state.faults.charge {
            return Err(mode.failure(
                TASK_CHARGE_CUSTOMER,
                FAILURE_INVALID_CREDIT_CARD,
                "charge customer task failed",
            ));
        }
        state.charged.insert(input.order_id.clone());
        Ok(input.order_id.clone())
    }

    async fn ship_order(&self, input: &ShippingInput) -> Result<(), TaskFailure> {
        tracing::info!(
            order_id = %input.order.order_id,
            item_id = input.item.id,
            item = %input.item.description,
            "ship order task started"
        );
        self.record(TASK_SHIP_ORDER);

        let failing = {
            let mut state = self.lock();
            let failing = state
                .faults
                .ship_item
                .filter(|(item_id, _)| *item_id == input.item.id);
            if failing.is_some() && state.faults.ship_item_once {
                state.faults.ship_item = None;
            }
            failing
        };
        if let Some((_, mode)) = failing {
            return Err(mode.failure(TASK_SHIP_ORDER, "ShipmentLost", "ship order failed"));
        }

        let units = rand::thread_rng().gen_range(1..=4);
        let delay = self.latency * units;
        tracing::info!(?delay, "shipping delay");
        durable_sleep(delay).await;

        *self.lock().shipped.entry(input.shipment_id()).or_insert(0) += 1;
        Ok(())
    }

    async fn undo_prepare_shipment(&self, input: &OrderInput) -> Result<UndoOutcome, TaskFailure> {
        tracing::info!(order_id = %input.order_id, "undo prepare shipment task started");
        self.record(TASK_UNDO_PREPARE_SHIPMENT);
        durable_sleep(self.latency).await;

        let mut state = self.lock();
        if state.faults.undo_prepare {
            return Err(TaskFailure::non_retryable(
                TASK_UNDO_PREPARE_SHIPMENT,
                "UndoRejected",
                "undo prepare shipment failed",
            ));
        }
        Ok(if state.prepared.remove(&input.order_id) {
            UndoOutcome::Reverted
        } else {
            UndoOutcome::NothingToUndo
        })
    }

    async fn undo_charge_customer(&self, input: &OrderInput) -> Result<UndoOutcome, TaskFailure> {
        tracing::info!(order_id = %input.order_id, "undo charge customer task started");
        self.record(TASK_UNDO_CHARGE_CUSTOMER);
        durable_sleep(self.latency).await;

        Ok(if self.lock().charged.remove(&input.order_id) {
            UndoOutcome::Reverted
        } else {
            UndoOutcome::NothingToUndo
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> OrderInput {
        OrderInput::new("1001", "123 Main St").unwrap()
    }

    #[tokio::test]
    async fn test_prepare_and_undo() {
        let tasks = SimulatedOrderActivities::instant();
        tasks.prepare_shipment(&order()).await.unwrap();
        assert!(tasks.is_prepared("1001"));

        let outcome = tasks.undo_prepare_shipment(&order()).await.unwrap();
        assert_eq!(outcome, UndoOutcome::Reverted);
        assert!(!tasks.is_prepared("1001"));
    }

    #[tokio::test]
    async fn test_undo_without_commit_is_noop() {
        let tasks = SimulatedOrderActivities::instant();
        tasks.fail_charge(FaultMode::Permanent);

        let charge = tasks
            .charge_customer(&order(), SagaRunVariant::HappyPath, 1)
            .await;
        assert!(charge.is_err());

        let outcome = tasks.undo_charge_customer(&order()).await.unwrap();
        assert_eq!(outcome, UndoOutcome::NothingToUndo);
        assert!(!tasks.is_charged("1001"));
    }

    #[tokio::test]
    async fn test_api_failure_variant_recovers_on_fifth_attempt() {
        let tasks = SimulatedOrderActivities::instant();
        for attempt in 1..5 {
            let failure = tasks
                .charge_customer(&order(), SagaRunVariant::ApiFailure, attempt)
                .await
                .unwrap_err();
            assert!(failure.retryable);
        }
        tasks
            .charge_customer(&order(), SagaRunVariant::ApiFailure, 5)
            .await
            .unwrap();
        assert!(tasks.is_charged("1001"));
    }

    #[tokio::test]
    async fn test_non_recoverable_variant_rejects_card() {
        let tasks = SimulatedOrderActivities::instant();
        let failure = tasks
            .charge_customer(&order(), SagaRunVariant::NonRecoverableFailure, 1)
            .await
            .unwrap_err();
        assert!(!failure.retryable);
        assert_eq!(
            failure.failure_type.as_deref(),
            Some(FAILURE_INVALID_CREDIT_CARD)
        );
    }

    #[tokio::test]
    async fn test_catalog_and_call_recording() {
        let tasks = SimulatedOrderActivities::instant();
        let items = tasks.get_items().await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].description, "Table Legs");
        assert_eq!(items[1].quantity, 2);
        assert_eq!(tasks.calls(), vec![TASK_GET_ITEMS.to_string()]);
    }

    #[tokio::test]
    async fn test_ship_item_fault_only_hits_that_item() {
        let tasks = SimulatedOrderActivities::instant();
        tasks.fail_ship_item(654321, FaultMode::Permanent);
        let items = SimulatedOrderActivities::catalog();

        let ok = tasks
            .ship_order(&ShippingInput::new(order(), items[0].clone()))
            .await;
        let failed = tasks
            .ship_order(&ShippingInput::new(order(), items[1].clone()))
            .await;

        assert!(ok.is_ok());
        assert!(failed.is_err());
        assert_eq!(tasks.total_shipped(), 1);
    }
}

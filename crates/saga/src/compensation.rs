//! LIFO registry of undo actions.

use common::OrderInput;
use futures_util::future::join_all;
use serde::Serialize;

use crate::error::TaskFailure;
use crate::order_fulfillment::{TASK_UNDO_CHARGE_CUSTOMER, TASK_UNDO_PREPARE_SHIPMENT};
use crate::runtime::{RetryPolicy, TaskExecutor};
use crate::services::activities::{OrderActivities, UndoOutcome};

/// A reversible action the saga knows how to undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CompensationAction {
    UndoPrepareShipment,
    UndoChargeCustomer,
}

impl CompensationAction {
    /// Name of the task that performs the undo.
    pub fn task_name(&self) -> &'static str {
        match self {
            CompensationAction::UndoPrepareShipment => TASK_UNDO_PREPARE_SHIPMENT,
            CompensationAction::UndoChargeCustomer => TASK_UNDO_CHARGE_CUSTOMER,
        }
    }

    async fn run<A>(self, activities: &A, input: &OrderInput) -> Result<UndoOutcome, TaskFailure>
    where
        A: OrderActivities + ?Sized,
    {
        match self {
            CompensationAction::UndoPrepareShipment => activities.undo_prepare_shipment(input).await,
            CompensationAction::UndoChargeCustomer => activities.undo_charge_customer(input).await,
        }
    }
}

/// A registered undo action with the arguments captured at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationEntry {
    pub action: CompensationAction,
    pub input: OrderInput,
}

/// How registered compensations are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompensationMode {
    /// One at a time, latest registration first.
    #[default]
    Sequential,
    /// All at once; results are still reported latest registration first.
    Parallel,
}

/// Outcome of one executed compensation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationRecord {
    pub action: CompensationAction,
    pub outcome: Result<UndoOutcome, TaskFailure>,
}

/// Run-scoped undo registry.
///
/// Entries are appended with [`add_compensation`](Self::add_compensation) and
/// executed in reverse registration order by [`compensate`](Self::compensate).
/// Compensating drains the ledger, so each entry runs at most once.
#[derive(Debug, Default)]
pub struct CompensationLedger {
    entries: Vec<CompensationEntry>,
    mode: CompensationMode,
}

impl CompensationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: CompensationMode) -> Self {
        Self {
            entries: Vec::new(),
            mode,
        }
    }

    /// Registers an undo action together with a snapshot of its argument.
    pub fn add_compensation(&mut self, action: CompensationAction, input: &OrderInput) {
        self.entries.push(CompensationEntry {
            action,
            input: input.clone(),
        });
    }

    pub fn entries(&self) -> &[CompensationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Executes every registered compensation, latest first.
    ///
    /// A failing undo is logged and does not stop the remaining ones.
    #[tracing::instrument(skip_all, fields(count = self.entries.len(), mode = ?self.mode))]
    pub async fn compensate<A>(
        &mut self,
        activities: &A,
        executor: &TaskExecutor,
        policy: &RetryPolicy,
    ) -> Vec<CompensationRecord>
    where
        A: OrderActivities + ?Sized,
    {
        tracing::info!("saga compensations started");
        let entries: Vec<CompensationEntry> = self.entries.drain(..).rev().collect();

        let records = match self.mode {
            CompensationMode::Sequential => {
                let mut records = Vec::with_capacity(entries.len());
                for entry in &entries {
                    records.push(run_entry(entry, activities, executor, policy).await);
                }
                records
            }
            CompensationMode::Parallel => {
                join_all(
                    entries
                        .iter()
                        .map(|entry| run_entry(entry, activities, executor, policy)),
                )
                .await
            }
        };

        metrics::counter!("saga_compensations_total").increment(records.len() as u64);
        records
    }
}

async fn run_entry<A>(
    entry: &CompensationEntry,
    activities: &A,
    executor: &TaskExecutor,
    policy: &RetryPolicy,
) -> CompensationRecord
where
    A: OrderActivities + ?Sized,
{
    let action = entry.action;
    let input = &entry.input;
    let outcome = executor
        .execute(action.task_name(), policy, move |_| action.run(activities, input))
        .await;

    match &outcome {
        Ok(result) => tracing::info!(?action, ?result, "compensation executed"),
        Err(err) => tracing::error!(?action, error = %err, "executing compensation failed"),
    }
    CompensationRecord { action, outcome }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::activities::SimulatedOrderActivities;

    fn order() -> OrderInput {
        OrderInput::new("2002", "55 Pine Rd").unwrap()
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::compensation().with_maximum_attempts(1)
    }

    #[tokio::test]
    async fn test_compensate_runs_in_reverse_order() {
        let tasks = SimulatedOrderActivities::instant();
        let mut ledger = CompensationLedger::new();
        ledger.add_compensation(CompensationAction::UndoPrepareShipment, &order());
        ledger.add_compensation(CompensationAction::UndoChargeCustomer, &order());

        let records = ledger
            .compensate(&tasks, &TaskExecutor::new(), &policy())
            .await;

        let actions: Vec<_> = records.iter().map(|r| r.action).collect();
        assert_eq!(
            actions,
            vec![
                CompensationAction::UndoChargeCustomer,
                CompensationAction::UndoPrepareShipment
            ]
        );
        assert_eq!(
            tasks.calls(),
            vec![TASK_UNDO_CHARGE_CUSTOMER, TASK_UNDO_PREPARE_SHIPMENT]
        );
    }

    #[tokio::test]
    async fn test_compensate_drains_ledger() {
        let tasks = SimulatedOrderActivities::instant();
        let mut ledger = CompensationLedger::new();
        ledger.add_compensation(CompensationAction::UndoPrepareShipment, &order());

        ledger
            .compensate(&tasks, &TaskExecutor::new(), &policy())
            .await;
        let second = ledger
            .compensate(&tasks, &TaskExecutor::new(), &policy())
            .await;

        assert!(second.is_empty());
        assert!(ledger.is_empty());
        assert_eq!(tasks.call_count(TASK_UNDO_PREPARE_SHIPMENT), 1);
    }

    #[tokio::test]
    async fn test_failing_undo_does_not_stop_the_rest() {
        let tasks = SimulatedOrderActivities::instant();
        tasks.fail_undo_prepare();
        let mut ledger = CompensationLedger::new();
        ledger.add_compensation(CompensationAction::UndoChargeCustomer, &order());
        ledger.add_compensation(CompensationAction::UndoPrepareShipment, &order());

        let records = ledger
            .compensate(&tasks, &TaskExecutor::new(), &policy())
            .await;

        assert_eq!(records.len(), 2);
        assert!(records[0].outcome.is_err());
        assert_eq!(records[1].outcome, Ok(UndoOutcome::NothingToUndo));
    }

    #[tokio::test]
    async fn test_parallel_mode_reports_reverse_order() {
        let tasks = SimulatedOrderActivities::instant();
        let mut ledger = CompensationLedger::with_mode(CompensationMode::Parallel);
        ledger.add_compensation(CompensationAction::UndoPrepareShipment, &order());
        ledger.add_compensation(CompensationAction::UndoChargeCustomer, &order());

        let records = ledger
            .compensate(&tasks, &TaskExecutor::new(), &policy())
            .await;

        assert_eq!(records[0].action, CompensationAction::UndoChargeCustomer);
        assert_eq!(records[1].action, CompensationAction::UndoPrepareShipment);
        assert_eq!(tasks.call_count(TASK_UNDO_CHARGE_CUSTOMER), 1);
        assert_eq!(tasks.call_count(TASK_UNDO_PREPARE_SHIPMENT), 1);
    }

    #[test]
    fn test_entries_capture_argument_snapshot() {
        let mut input = order();
        let mut ledger = CompensationLedger::new();
        ledger.add_compensation(CompensationAction::UndoPrepareShipment, &input);
        input.address = "9 Changed Ave".to_string();

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.entries()[0].input.address, "55 Pine Rd");
    }
}

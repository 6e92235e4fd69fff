//! Saga coordinator for the order fulfillment run.

use std::sync::Arc;

use common::{OrderInput, OrderItem, OrderOutput};

use crate::child::ChildExecutions;
use crate::compensation::{CompensationAction, CompensationLedger};
use crate::config::SagaConfig;
use crate::dispatch::{ShipmentDispatcher, join_shipments};
use crate::error::SagaError;
use crate::handle::{OrderHandle, RunContext};
use crate::order_fulfillment::{
    SAGA_TYPE, Stage, TASK_CHARGE_CUSTOMER, TASK_CHECK_FRAUD, TASK_GET_ITEMS,
    TASK_PREPARE_SHIPMENT,
};
use crate::runtime::{TaskExecutor, durable_sleep};
use crate::services::activities::OrderActivities;
use crate::services::shipping::{LocalShippingService, RemoteOperationClient};
use crate::state::SagaState;
use crate::variant::SagaRunVariant;

/// Orchestrates order fulfillment runs.
///
/// Each run fetches the items, checks fraud, prepares the shipment, charges
/// the customer and ships every item using the variant's dispatch strategy.
/// Failures after the fraud check compensate the committed steps in reverse
/// order of registration.
pub struct OrderSaga<A: OrderActivities> {
    activities: Arc<A>,
    config: SagaConfig,
    executor: TaskExecutor,
    children: ChildExecutions,
    remote: Arc<dyn RemoteOperationClient>,
}

impl<A: OrderActivities> Clone for OrderSaga<A> {
    fn clone(&self) -> Self {
        Self {
            activities: self.activities.clone(),
            config: self.config.clone(),
            executor: self.executor,
            children: self.children.clone(),
            remote: self.remote.clone(),
        }
    }
}

impl<A: OrderActivities> OrderSaga<A> {
    /// Creates a coordinator with an in-process shipping service registered
    /// under the configured endpoint.
    pub fn new(activities: Arc<A>, config: SagaConfig) -> Self {
        let children = ChildExecutions::new();
        let remote = Arc::new(LocalShippingService::new(
            activities.clone(),
            children.clone(),
            config.shipping_endpoint.clone(),
            config.retry_policy.clone(),
        ));
        Self {
            activities,
            config,
            executor: TaskExecutor::new(),
            children,
            remote,
        }
    }

    /// Replaces the client used for remote shipping operations.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteOperationClient>) -> Self {
        self.remote = remote;
        self
    }

    /// Registry of child runs started by this coordinator.
    pub fn children(&self) -> &ChildExecutions {
        &self.children
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Starts a run in the background and returns its handle.
    pub fn start(&self, input: OrderInput, variant: SagaRunVariant) -> OrderHandle {
        let ctx = RunContext::new(&input, variant);
        let handle = ctx.handle();
        let saga = self.clone();
        tokio::spawn(async move { saga.drive(ctx, input).await });
        handle
    }

    /// Runs to completion and returns the outcome.
    pub async fn run(
        &self,
        input: OrderInput,
        variant: SagaRunVariant,
    ) -> Result<OrderOutput, SagaError> {
        self.start(input, variant).result().await
    }

    #[tracing::instrument(
        skip_all,
        fields(run_id = %ctx.run_id(), variant = %ctx.variant(), saga_type = SAGA_TYPE)
    )]
    async fn drive(self, ctx: RunContext, input: OrderInput) {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = std::time::Instant::now();
        tracing::info!(order_id = %input.order_id, address = %input.address, "saga started");
        ctx.set_state(SagaState::Running);

        let outcome = self.execute(&ctx, input).await;

        let duration = saga_start.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        match &outcome {
            Ok(output) => {
                metrics::counter!("saga_completed").increment(1);
                tracing::info!(tracking_id = %output.tracking_id, duration, "saga completed successfully");
            }
            Err(err) => {
                metrics::counter!("saga_failed").increment(1);
                let terminated = self.children.close_parent(ctx.run_id());
                tracing::error!(error = %err, terminated, duration, "saga failed");
            }
        }
        let released = self.children.release_parent(ctx.run_id());
        tracing::debug!(released, "released child runs");
        ctx.finish(outcome);
    }

    async fn execute(&self, ctx: &RunContext, input: OrderInput) -> Result<OrderOutput, SagaError> {
        let policy = &self.config.retry_policy;
        let tasks = &*self.activities;
        let order = &input;

        let items: Vec<OrderItem> = self
            .executor
            .execute(TASK_GET_ITEMS, policy, move |_| tasks.get_items())
            .await?;
        for item in &items {
            tracing::info!(item_id = item.id, item = %item.description, quantity = item.quantity, "order item");
        }

        self.milestone(ctx, Stage::CheckFraud).await;
        self.executor
            .execute(TASK_CHECK_FRAUD, policy, move |_| tasks.check_fraud(order))
            .await?;

        let mut ledger = CompensationLedger::with_mode(self.config.compensation_mode);

        self.milestone(ctx, Stage::PrepareShipment).await;
        ledger.add_compensation(CompensationAction::UndoPrepareShipment, &input);
        if let Err(failure) = self
            .executor
            .execute(TASK_PREPARE_SHIPMENT, policy, move |_| {
                tasks.prepare_shipment(order)
            })
            .await
        {
            return Err(self.abort(ctx, &mut ledger, failure.into()).await);
        }

        self.milestone(ctx, Stage::ChargeCustomer).await;
        ledger.add_compensation(CompensationAction::UndoChargeCustomer, &input);
        let variant = ctx.variant();
        if let Err(failure) = self
            .executor
            .execute(TASK_CHARGE_CUSTOMER, policy, move |attempt| {
                tasks.charge_customer(order, variant, attempt)
            })
            .await
        {
            return Err(self.abort(ctx, &mut ledger, failure.into()).await);
        }

        self.milestone(ctx, Stage::ShipOrder).await;
        if variant.injects_simulated_fault() {
            tracing::warn!("simulated bug raised");
            return Err(SagaError::SimulatedFault);
        }

        let address = self.await_address(ctx, &input).await;
        let order = OrderInput {
            address,
            ..input
        };

        ctx.set_state(SagaState::Shipping);
        let dispatcher = ShipmentDispatcher::new(
            variant.dispatch_strategy(),
            ctx.run_id(),
            self.activities.clone(),
            self.executor,
            policy.clone(),
            self.children.clone(),
            self.remote.clone(),
            self.config.shipping_endpoint.clone(),
        );
        let mut handles = Vec::with_capacity(items.len());
        for item in &items {
            handles.push(dispatcher.dispatch(&order, item).await?);
        }
        let receipts = join_shipments(handles).await?;
        tracing::info!(shipments = receipts.len(), strategy = ?dispatcher.strategy(), "all items shipped");

        self.milestone(ctx, Stage::OrderCompleted).await;
        Ok(OrderOutput {
            tracking_id: uuid::Uuid::new_v4().to_string(),
            address: order.address,
        })
    }

    /// Opens the address window for variants that take corrections and
    /// returns the address to ship to.
    async fn await_address(&self, ctx: &RunContext, input: &OrderInput) -> String {
        if !ctx.variant().awaits_address_update() {
            return input.address.clone();
        }

        ctx.set_state(SagaState::AwaitingAddress);
        tracing::info!(wait = ?self.config.address_wait, "waiting for address update");
        if ctx.gate().wait(self.config.address_wait).await {
            if let Some(address) = ctx.gate().pending() {
                tracing::info!(%address, "address updated");
                return address;
            }
        }
        tracing::info!("no address update received, keeping original address");
        input.address.clone()
    }

    /// Runs the compensations and wraps the triggering failure.
    #[tracing::instrument(skip(self, ctx, ledger))]
    async fn abort(
        &self,
        ctx: &RunContext,
        ledger: &mut CompensationLedger,
        cause: SagaError,
    ) -> SagaError {
        let can_compensate = ctx.state().can_compensate();
        ctx.set_state(SagaState::Compensating);
        if !can_compensate {
            tracing::warn!(state = %ctx.state(), "compensating outside of running state");
        }

        let records = ledger
            .compensate(
                &*self.activities,
                &self.executor,
                &self.config.compensation_policy,
            )
            .await;
        tracing::info!(compensations = records.len(), "saga compensations finished");

        SagaError::Aborted {
            source: Box::new(cause),
            compensations: records.len(),
        }
    }

    async fn milestone(&self, ctx: &RunContext, stage: Stage) {
        ctx.progress().advance(stage.percent(), stage.status_label());
        durable_sleep(self.config.pause_unit * stage.pause_units()).await;
    }
}

//! Shipment dispatch: three interchangeable ways to ship one item behind a
//! single handle type.

use std::sync::Arc;

use common::{OrderInput, OrderItem, ShippingInput};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, try_join_all};
use serde::{Deserialize, Serialize};

use crate::child::{ChildExecutions, ParentClosePolicy};
use crate::error::SagaError;
use crate::order_fulfillment::{SHIP_ORDER_OPERATION, SHIPPING_SERVICE, TASK_SHIP_ORDER};
use crate::runtime::{RetryPolicy, TaskExecutor};
use crate::services::activities::OrderActivities;
use crate::services::shipping::{RemoteOperationClient, ship_item};

/// Strategy used to ship an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchStrategy {
    /// Invoke the ship task directly.
    Direct,
    /// Start an identity-keyed child run per item.
    ChildExecution,
    /// Start an operation on the separately addressed shipping service.
    RemoteOperation,
}

/// Result of shipping one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipmentReceipt {
    pub shipment_id: String,
    pub item_id: i64,
    pub strategy: DispatchStrategy,
}

/// A pending shipment, whichever strategy started it.
pub struct ShipmentHandle {
    item_id: i64,
    strategy: DispatchStrategy,
    result: BoxFuture<'static, Result<ShipmentReceipt, SagaError>>,
}

impl std::fmt::Debug for ShipmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShipmentHandle")
            .field("item_id", &self.item_id)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl ShipmentHandle {
    pub fn item_id(&self) -> i64 {
        self.item_id
    }

    pub fn strategy(&self) -> DispatchStrategy {
        self.strategy
    }

    /// Waits for the shipment to resolve.
    pub async fn wait(self) -> Result<ShipmentReceipt, SagaError> {
        self.result.await
    }
}

/// Waits for every shipment. The first failure fails the whole join.
pub async fn join_shipments(
    handles: Vec<ShipmentHandle>,
) -> Result<Vec<ShipmentReceipt>, SagaError> {
    try_join_all(handles.into_iter().map(ShipmentHandle::wait)).await
}

/// Starts shipments for one run using the run's strategy.
pub struct ShipmentDispatcher<A: OrderActivities> {
    strategy: DispatchStrategy,
    parent_id: String,
    activities: Arc<A>,
    executor: TaskExecutor,
    policy: RetryPolicy,
    children: ChildExecutions,
    remote: Arc<dyn RemoteOperationClient>,
    endpoint: String,
}

impl<A: OrderActivities> ShipmentDispatcher<A> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy: DispatchStrategy,
        parent_id: impl Into<String>,
        activities: Arc<A>,
        executor: TaskExecutor,
        policy: RetryPolicy,
        children: ChildExecutions,
        remote: Arc<dyn RemoteOperationClient>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            strategy,
            parent_id: parent_id.into(),
            activities,
            executor,
            policy,
            children,
            remote,
            endpoint: endpoint.into(),
        }
    }

    pub fn strategy(&self) -> DispatchStrategy {
        self.strategy
    }

    /// Starts shipping `item` and returns its pending handle.
    ///
    /// The handle is returned as soon as the shipment has been started; only
    /// the remote strategy waits here, for the operation's started
    /// acknowledgement.
    pub async fn dispatch(
        &self,
        order: &OrderInput,
        item: &OrderItem,
    ) -> Result<ShipmentHandle, SagaError> {
        let input = ShippingInput::new(order.clone(), item.clone());
        let result = match self.strategy {
            DispatchStrategy::Direct => self.start_direct(input),
            DispatchStrategy::ChildExecution => self.start_child(input),
            DispatchStrategy::RemoteOperation => self.start_remote(input).await?,
        };
        Ok(ShipmentHandle {
            item_id: item.id,
            strategy: self.strategy,
            result,
        })
    }

    fn start_direct(&self, input: ShippingInput) -> BoxFuture<'static, Result<ShipmentReceipt, SagaError>> {
        let activities = self.activities.clone();
        let executor = self.executor;
        let policy = self.policy.clone();
        let shipment_id = input.shipment_id();
        let item_id = input.item.id;

        let task = tokio::spawn(async move {
            let tasks = &*activities;
            let shipping = &input;
            executor
                .execute(TASK_SHIP_ORDER, &policy, move |_| tasks.ship_order(shipping))
                .await
        });
        tracing::info!(%shipment_id, "started task: ship order");

        async move {
            match task.await {
                Ok(Ok(())) => Ok(ShipmentReceipt {
                    shipment_id,
                    item_id,
                    strategy: DispatchStrategy::Direct,
                }),
                Ok(Err(failure)) => Err(SagaError::Task(failure)),
                Err(err) => Err(SagaError::ChildTerminated {
                    id: shipment_id,
                    reason: err.to_string(),
                }),
            }
        }
        .boxed()
    }

    fn start_child(&self, input: ShippingInput) -> BoxFuture<'static, Result<ShipmentReceipt, SagaError>> {
        let shipment_id = input.shipment_id();
        let run = ship_item(
            self.activities.clone(),
            self.executor,
            self.policy.clone(),
            input,
            DispatchStrategy::ChildExecution,
        );
        let handle = self.children.start(
            shipment_id,
            &self.parent_id,
            ParentClosePolicy::Terminate,
            run,
        );
        tracing::info!(
            shipment_id = handle.id(),
            newly_started = handle.newly_started(),
            "started child run"
        );
        handle.wait().boxed()
    }

    async fn start_remote(
        &self,
        input: ShippingInput,
    ) -> Result<BoxFuture<'static, Result<ShipmentReceipt, SagaError>>, SagaError> {
        let operation = self
            .remote
            .start_operation(&self.endpoint, SHIPPING_SERVICE, SHIP_ORDER_OPERATION, input)
            .await?;
        tracing::info!(token = %operation.token(), "started remote operation");
        Ok(operation.into_result())
    }
}

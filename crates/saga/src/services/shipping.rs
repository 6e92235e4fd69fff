//! Shipping run and the remote shipping service reached through operations.

use std::sync::Arc;

use async_trait::async_trait;
use common::ShippingInput;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::child::{ChildExecutions, ParentClosePolicy};
use crate::dispatch::{DispatchStrategy, ShipmentReceipt};
use crate::error::SagaError;
use crate::order_fulfillment::{SHIP_ORDER_OPERATION, SHIPPING_SERVICE, TASK_SHIP_ORDER};
use crate::runtime::{RetryPolicy, TaskExecutor};
use crate::services::activities::OrderActivities;

/// The shipping run executed per item by child and remote dispatch.
pub async fn ship_item<A: OrderActivities>(
    activities: Arc<A>,
    executor: TaskExecutor,
    policy: RetryPolicy,
    input: ShippingInput,
    strategy: DispatchStrategy,
) -> Result<ShipmentReceipt, SagaError> {
    let shipment_id = input.shipment_id();
    tracing::info!(%shipment_id, order_id = %input.order.order_id, "shipping run started");

    let tasks = &*activities;
    let shipping = &input;
    executor
        .execute(TASK_SHIP_ORDER, &policy, move |_| tasks.ship_order(shipping))
        .await?;

    Ok(ShipmentReceipt {
        shipment_id,
        item_id: input.item.id,
        strategy,
    })
}

/// A started remote operation.
///
/// Holding one means the service acknowledged the start; the result
/// resolves later.
pub struct OperationHandle {
    token: String,
    result: BoxFuture<'static, Result<ShipmentReceipt, SagaError>>,
}

impl OperationHandle {
    pub fn new(
        token: impl Into<String>,
        result: BoxFuture<'static, Result<ShipmentReceipt, SagaError>>,
    ) -> Self {
        Self {
            token: token.into(),
            result,
        }
    }

    /// Token identifying the operation on the remote service.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn into_result(self) -> BoxFuture<'static, Result<ShipmentReceipt, SagaError>> {
        self.result
    }
}

/// Client for asynchronous operations on separately addressed services.
#[async_trait]
pub trait RemoteOperationClient: Send + Sync {
    /// Starts `operation` of `service` at `endpoint` and waits for the start
    /// acknowledgement.
    async fn start_operation(
        &self,
        endpoint: &str,
        service: &str,
        operation: &str,
        input: ShippingInput,
    ) -> Result<OperationHandle, SagaError>;
}

/// In-process shipping service registered under one endpoint name.
///
/// Each `ship-order` operation starts the shipping run keyed by the
/// shipment id, so repeated operations for the same item share one run. The
/// runs are not coupled to the caller's lifecycle.
pub struct LocalShippingService<A: OrderActivities> {
    activities: Arc<A>,
    children: ChildExecutions,
    endpoint: String,
    executor: TaskExecutor,
    policy: RetryPolicy,
}

impl<A: OrderActivities> LocalShippingService<A> {
    pub fn new(
        activities: Arc<A>,
        children: ChildExecutions,
        endpoint: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            activities,
            children,
            endpoint: endpoint.into(),
            executor: TaskExecutor::new(),
            policy,
        }
    }

    fn rejection(&self, operation: &str, reason: impl Into<String>) -> SagaError {
        SagaError::RemoteOperation {
            endpoint: self.endpoint.clone(),
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl<A: OrderActivities> RemoteOperationClient for LocalShippingService<A> {
    async fn start_operation(
        &self,
        endpoint: &str,
        service: &str,
        operation: &str,
        input: ShippingInput,
    ) -> Result<OperationHandle, SagaError> {
        if endpoint != self.endpoint {
            return Err(self.rejection(operation, format!("unknown endpoint '{endpoint}'")));
        }
        if service != SHIPPING_SERVICE || operation != SHIP_ORDER_OPERATION {
            return Err(self.rejection(
                operation,
                format!("service '{service}' has no operation '{operation}'"),
            ));
        }

        let token = input.shipment_id();
        let run = ship_item(
            self.activities.clone(),
            self.executor,
            self.policy.clone(),
            input,
            DispatchStrategy::RemoteOperation,
        );
        let child = self.children.start(
            token.clone(),
            &format!("endpoint:{}", self.endpoint),
            ParentClosePolicy::Abandon,
            run,
        );
        tracing::debug!(%token, newly_started = child.newly_started(), "remote operation accepted");

        Ok(OperationHandle::new(token, child.wait().boxed()))
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderInput, OrderItem};

    use super::*;
    use crate::services::activities::SimulatedOrderActivities;

    fn service(tasks: &SimulatedOrderActivities) -> LocalShippingService<SimulatedOrderActivities> {
        LocalShippingService::new(
            Arc::new(tasks.clone()),
            ChildExecutions::new(),
            "shipping-endpoint",
            RetryPolicy::default(),
        )
    }

    fn input() -> ShippingInput {
        ShippingInput::new(
            OrderInput::new("4004", "3 Cedar Ct").unwrap(),
            OrderItem::new(654300, "Table Top", 1).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_operation_acknowledges_then_resolves() {
        let tasks = SimulatedOrderActivities::instant();
        let service = service(&tasks);

        let handle = service
            .start_operation(
                "shipping-endpoint",
                SHIPPING_SERVICE,
                SHIP_ORDER_OPERATION,
                input(),
            )
            .await
            .unwrap();
        assert_eq!(handle.token(), "shipment-4004-654300");

        let receipt = handle.into_result().await.unwrap();
        assert_eq!(receipt.strategy, DispatchStrategy::RemoteOperation);
        assert_eq!(tasks.shipped_count("shipment-4004-654300"), 1);
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_rejected() {
        let tasks = SimulatedOrderActivities::instant();
        let result = service(&tasks)
            .start_operation("billing-endpoint", SHIPPING_SERVICE, SHIP_ORDER_OPERATION, input())
            .await;
        assert!(matches!(result, Err(SagaError::RemoteOperation { .. })));
        assert_eq!(tasks.total_shipped(), 0);
    }

    #[tokio::test]
    async fn test_unknown_operation_is_rejected() {
        let tasks = SimulatedOrderActivities::instant();
        let result = service(&tasks)
            .start_operation("shipping-endpoint", SHIPPING_SERVICE, "cancel-order", input())
            .await;
        assert!(matches!(result, Err(SagaError::RemoteOperation { .. })));
    }
}

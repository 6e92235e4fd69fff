//! Saga pattern implementation for order fulfillment.
//!
//! An order run executes these steps:
//! 1. Get the order items
//! 2. Check fraud
//! 3. Prepare the shipment
//! 4. Charge the customer
//! 5. Ship every item, directly, through child runs or through a remote
//!    shipping operation
//!
//! Undo tasks are registered before their forward step. If step 3 or 4 fails,
//! the registered undos run in reverse order. Runs expose progress queries and
//! accept address corrections while they wait before shipping.

pub mod child;
pub mod compensation;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod handle;
pub mod order_fulfillment;
pub mod progress;
pub mod runtime;
pub mod services;
pub mod state;
pub mod variant;

pub use child::{ChildExecutions, ChildHandle, ParentClosePolicy};
pub use compensation::{CompensationAction, CompensationLedger, CompensationMode};
pub use config::SagaConfig;
pub use coordinator::OrderSaga;
pub use dispatch::{DispatchStrategy, ShipmentHandle, ShipmentReceipt};
pub use error::{SagaError, TaskFailure};
pub use gate::{AddressUpdateGate, validate_address};
pub use handle::{OrderHandle, RunOutcome};
pub use progress::{Milestone, ProgressSnapshot, ProgressTracker};
pub use runtime::{RetryPolicy, TaskExecutor};
pub use services::{
    FaultMode, LocalShippingService, OperationHandle, OrderActivities, RemoteOperationClient,
    SimulatedOrderActivities, UndoOutcome,
};
pub use state::SagaState;
pub use variant::SagaRunVariant;

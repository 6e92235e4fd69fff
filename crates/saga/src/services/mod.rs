//! Tasks invoked by the saga and the services they reach.

pub mod activities;
pub mod shipping;

pub use activities::{FaultMode, OrderActivities, SimulatedOrderActivities, UndoOutcome};
pub use shipping::{LocalShippingService, OperationHandle, RemoteOperationClient, ship_item};

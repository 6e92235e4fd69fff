//! Order fulfillment saga constants.

/// The run type prefix for order fulfillment; variants append their scenario name.
pub const SAGA_TYPE: &str = "OrderWorkflow";

/// Task: fetch the catalog line items of the order.
pub const TASK_GET_ITEMS: &str = "GetItems";

/// Task: run the fraud check.
pub const TASK_CHECK_FRAUD: &str = "CheckFraud";

/// Task: prepare the shipment.
pub const TASK_PREPARE_SHIPMENT: &str = "PrepareShipment";

/// Task: charge the customer.
pub const TASK_CHARGE_CUSTOMER: &str = "ChargeCustomer";

/// Task: ship a single item.
pub const TASK_SHIP_ORDER: &str = "ShipOrder";

/// Compensation for [`TASK_PREPARE_SHIPMENT`].
pub const TASK_UNDO_PREPARE_SHIPMENT: &str = "UndoPrepareShipment";

/// Compensation for [`TASK_CHARGE_CUSTOMER`].
pub const TASK_UNDO_CHARGE_CUSTOMER: &str = "UndoChargeCustomer";

/// Query returning the completion percentage.
pub const QUERY_GET_PROGRESS: &str = "getProgress";

/// Query returning the projected status label.
pub const QUERY_ORDER_STATUS: &str = "OrderStatus";

/// Signal and update carrying a corrected delivery address.
pub const MESSAGE_UPDATE_ORDER: &str = "UpdateOrder";

/// Search attribute key of the status projection.
pub const ORDER_STATUS_KEY: &str = "OrderStatus";

/// Failure type of a rejected payment instrument.
pub const FAILURE_INVALID_CREDIT_CARD: &str = "InvalidCreditCard";

/// Name of the shipping service reached through remote operations.
pub const SHIPPING_SERVICE: &str = "shipping-service";

/// Operation started on [`SHIPPING_SERVICE`].
pub const SHIP_ORDER_OPERATION: &str = "ship-order";

/// Default endpoint addressing the shipping service.
pub const DEFAULT_SHIPPING_ENDPOINT: &str = "shipping-endpoint";

/// Progress milestones of a run, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckFraud,
    PrepareShipment,
    ChargeCustomer,
    ShipOrder,
    OrderCompleted,
}

impl Stage {
    /// Completion percentage set when the stage is entered.
    pub fn percent(&self) -> u8 {
        match self {
            Stage::CheckFraud => 0,
            Stage::PrepareShipment => 25,
            Stage::ChargeCustomer => 50,
            Stage::ShipOrder => 75,
            Stage::OrderCompleted => 100,
        }
    }

    /// Label projected under [`ORDER_STATUS_KEY`].
    pub fn status_label(&self) -> &'static str {
        match self {
            Stage::CheckFraud => "Check Fraud",
            Stage::PrepareShipment => "Prepare Shipment",
            Stage::ChargeCustomer => "Charge Customer",
            Stage::ShipOrder => "Ship Order",
            Stage::OrderCompleted => "Order Completed",
        }
    }

    /// Observation pause after the milestone, in pause units.
    pub fn pause_units(&self) -> u32 {
        match self {
            Stage::CheckFraud | Stage::OrderCompleted => 0,
            Stage::PrepareShipment | Stage::ChargeCustomer => 1,
            Stage::ShipOrder => 3,
        }
    }
}

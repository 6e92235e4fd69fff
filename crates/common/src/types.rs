use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when constructing order models from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("order id must not be empty")]
    EmptyOrderId,

    #[error("item {item_id} has invalid quantity {quantity}")]
    InvalidQuantity { item_id: i64, quantity: u32 },
}

/// Input that starts an order-fulfillment run.
///
/// `order_id` is the identity of the run and never changes. `address` is the
/// only field that may be replaced while the run is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInput {
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub address: String,
}

impl OrderInput {
    /// Creates an order input, rejecting an empty order id.
    pub fn new(order_id: impl Into<String>, address: impl Into<String>) -> Result<Self, ModelError> {
        let order_id = order_id.into();
        if order_id.is_empty() {
            return Err(ModelError::EmptyOrderId);
        }
        Ok(Self {
            order_id,
            address: address.into(),
        })
    }

    /// Returns the run identifier used for this order (`order-<orderId>`).
    pub fn run_id(&self) -> String {
        format!("order-{}", self.order_id)
    }
}

/// A single line item of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub description: String,
    pub quantity: u32,
}

impl OrderItem {
    /// Creates a line item. Quantity must be positive.
    pub fn new(id: i64, description: impl Into<String>, quantity: u32) -> Result<Self, ModelError> {
        if quantity == 0 {
            return Err(ModelError::InvalidQuantity {
                item_id: id,
                quantity,
            });
        }
        Ok(Self {
            id,
            description: description.into(),
            quantity,
        })
    }
}

/// Result of a successfully fulfilled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOutput {
    #[serde(rename = "trackingId")]
    pub tracking_id: String,
    pub address: String,
}

/// Payload of the `UpdateOrder` signal and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrderInput {
    pub address: String,
}

/// Everything needed to ship one item of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInput {
    pub order: OrderInput,
    pub item: OrderItem,
}

impl ShippingInput {
    pub fn new(order: OrderInput, item: OrderItem) -> Self {
        Self { order, item }
    }

    /// Identity key of the shipment sub-run: `shipment-<orderId>-<itemId>`.
    pub fn shipment_id(&self) -> String {
        format!("shipment-{}-{}", self.order.order_id, self.item.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_input_rejects_empty_id() {
        assert_eq!(
            OrderInput::new("", "123 Main St"),
            Err(ModelError::EmptyOrderId)
        );
    }

    #[test]
    fn test_order_input_run_id() {
        let input = OrderInput::new("654321", "123 Main St").unwrap();
        assert_eq!(input.run_id(), "order-654321");
    }

    #[test]
    fn test_order_item_rejects_zero_quantity() {
        let result = OrderItem::new(1, "Keypad", 0);
        assert!(matches!(result, Err(ModelError::InvalidQuantity { .. })));
    }

    #[test]
    fn test_shipment_id_is_keyed_by_order_and_item() {
        let order = OrderInput::new("42", "1 Elm St").unwrap();
        let item = OrderItem::new(654300, "Table Top", 1).unwrap();
        assert_eq!(
            ShippingInput::new(order, item).shipment_id(),
            "shipment-42-654300"
        );
    }

    #[test]
    fn test_order_input_uses_camel_case_wire_names() {
        let input = OrderInput::new("7", "9 Oak Ave").unwrap();
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["orderId"], "7");
        assert_eq!(json["address"], "9 Oak Ave");
    }

    #[test]
    fn test_order_output_uses_tracking_id_wire_name() {
        let json = r#"{"trackingId":"abc","address":"1 Main"}"#;
        let output: OrderOutput = serde_json::from_str(json).unwrap();
        assert_eq!(output.tracking_id, "abc");
    }
}

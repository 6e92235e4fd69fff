//! Shared order models exchanged between the saga, its tasks and the API.

pub mod types;

pub use types::{ModelError, OrderInput, OrderItem, OrderOutput, ShippingInput, UpdateOrderInput};

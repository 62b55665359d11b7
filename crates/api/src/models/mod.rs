//! Domain types for the gateway.
//!
//! These are the validated shapes handlers work with. Rows arriving from the
//! Data Store are decoded into them by the repositories in [`crate::db`];
//! request bodies are checked by the `validate`/`into_*` helpers here before
//! anything is written.

pub mod customer;
pub mod order;
pub mod product;
pub mod profile;

pub use customer::{CreateCustomerRequest, Customer, UpdateCustomerRequest};
pub use order::{
    CreateOrderRequest, Order, OrderDetails, OrderItem, OrderLineRequest,
    SalesReport, UpdateOrderRequest,
};
pub use product::{CreateProductRequest, InventoryAdjustRequest, Product, UpdateProductRequest};
pub use profile::{CurrentProfile, Profile};

/// Trim an optional text field, turning blanks into `None`.
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Trim a required text field; `Err` names the field when it is blank.
pub(crate) fn required(field: &str, value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(format!("{field} is required"))
    } else {
        Ok(trimmed.to_string())
    }
}

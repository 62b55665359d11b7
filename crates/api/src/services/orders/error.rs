//! Order placement errors.

use thiserror::Error;

use appejv_core::{CustomerId, OrderId, ProductId};

use crate::db::RepositoryError;

#[derive(Debug, Error)]
pub enum OrderError {
    /// The request itself is unusable (no lines, bad quantity, too many lines).
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Customer {0} not found")]
    CustomerNotFound(CustomerId),

    /// Missing or soft-deleted product. Nothing was written.
    #[error("Product {0} not found")]
    ProductNotFound(ProductId),

    /// Not enough stock for the quantity requested across all lines, either
    /// at the check or because a concurrent order reserved it first. Nothing
    /// written remains.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: i64,
    },

    /// A write failed after the order header was created.
    ///
    /// `compensated` tells whether the order was fully unwound. Either way
    /// the order stays out of listings and reports; when `false` the
    /// reconciliation pass finishes the unwinding, and stock that could not
    /// be restored is logged.
    /// `line_index` equals the number of lines when only the final
    /// confirmation failed.
    #[error("Order {order_id} failed at line {line_index}")]
    PartialWriteFailure {
        order_id: OrderId,
        line_index: usize,
        compensated: bool,
        reason: String,
    },

    /// A Data Store call failed before anything was written.
    #[error("data store unavailable: {0}")]
    StoreUnavailable(#[from] RepositoryError),

    /// The request deadline passed before anything was written.
    #[error("order placement timed out")]
    DeadlineExceeded,
}

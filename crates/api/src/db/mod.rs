//! Typed repositories over the Data Store.
//!
//! # Collections
//!
//! - `profiles` - application profile per identity subject (read-only here)
//! - `products` - catalogue with price and stock
//! - `customers` - customers managed by sales staff
//! - `orders` - order headers
//! - `order_items` - order lines with the price at order time
//!
//! Every collection except `profiles` and `order_items` is soft-deleted
//! through a `deleted_at` timestamp; reads exclude those rows.

pub mod customers;
pub mod orders;
pub mod products;
pub mod profiles;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::store::{Row, StoreError};

pub use customers::CustomerRepository;
pub use orders::{NewOrderItem, OrderFilter, OrderRepository};
pub use products::{ProductFilter, ProductRepository};
pub use profiles::ProfileRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The Data Store call failed.
    #[error("data store error: {0}")]
    Store(#[from] StoreError),

    /// A row came back in a shape the gateway cannot use.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// Decode raw rows into `R`, then validate them into `M`.
fn decode_rows<R, M>(rows: Vec<Row>) -> Result<Vec<M>, RepositoryError>
where
    R: DeserializeOwned,
    M: TryFrom<R, Error = RepositoryError>,
{
    rows.into_iter().map(decode_row::<R, M>).collect()
}

fn decode_row<R, M>(row: Row) -> Result<M, RepositoryError>
where
    R: DeserializeOwned,
    M: TryFrom<R, Error = RepositoryError>,
{
    let raw: R = serde_json::from_value(Value::Object(row))
        .map_err(|e| RepositoryError::DataCorruption(format!("undecodable row: {e}")))?;
    M::try_from(raw)
}

/// First row of a write that must return exactly what it stored.
fn returned_row<R, M>(rows: Vec<Row>) -> Result<M, RepositoryError>
where
    R: DeserializeOwned,
    M: TryFrom<R, Error = RepositoryError>,
{
    let row = rows.into_iter().next().ok_or_else(|| {
        RepositoryError::DataCorruption("write returned no representation".to_string())
    })?;
    decode_row::<R, M>(row)
}

/// Value for a `deleted_at` / timestamp column set to now.
fn now_value() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339())
}

//! Order and order line repository.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use appejv_core::{
    CustomerId, OrderId, OrderItemId, OrderStatus, PageRequest, ProductId, SubjectId,
};

use super::{RepositoryError, decode_rows, now_value, returned_row};
use crate::models::{Order, OrderItem};
use crate::store::{Collection, DELETED_AT, DataStore, Direction, Query, row};

#[derive(Debug, Deserialize)]
struct OrderRow {
    id: i64,
    customer_id: i64,
    sale_id: String,
    status: String,
    total_amount: Decimal,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<OrderStatus>().map_err(|e| {
            RepositoryError::DataCorruption(format!("order {}: {e}", row.id))
        })?;

        Ok(Self {
            id: OrderId::new(row.id),
            customer_id: CustomerId::new(row.customer_id),
            sale_id: SubjectId::new(row.sale_id),
            status,
            total_amount: row.total_amount,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OrderItemRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    quantity: i64,
    price_at_order: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| {
                RepositoryError::DataCorruption(format!(
                    "order item {} has invalid quantity {}",
                    row.id, row.quantity
                ))
            })?;

        Ok(Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: ProductId::new(row.product_id),
            quantity,
            price_at_order: row.price_at_order,
        })
    }
}

/// Filters for the order listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<CustomerId>,
}

/// A line to insert for an order.
#[derive(Debug, Clone, Copy)]
pub struct NewOrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price_at_order: Decimal,
}

/// Orders staff can see: not soft-deleted, and neither still being placed
/// nor being unwound by the workflow.
fn visible() -> Query {
    Query::new(Collection::Orders)
        .live()
        .neq("status", OrderStatus::Placing.as_str())
        .neq("status", OrderStatus::Failed.as_str())
}

pub struct OrderRepository<'a> {
    store: &'a dyn DataStore,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn DataStore) -> Self {
        Self { store }
    }

    /// One page of visible orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the read fails or a row is invalid.
    pub async fn list(
        &self,
        filter: OrderFilter,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), RepositoryError> {
        let mut query = visible();
        if let Some(status) = filter.status {
            query = query.eq("status", status.as_str());
        }
        if let Some(customer_id) = filter.customer_id {
            query = query.eq("customer_id", customer_id.as_i64());
        }
        let query = query
            .order_by("created_at", Direction::Desc)
            .order_by("id", Direction::Desc)
            .range(page.offset(), u64::from(page.limit()))
            .exact_count();

        let selection = self.store.select(&query).await?;
        let total = selection.total.unwrap_or(0);
        Ok((decode_rows::<OrderRow, Order>(selection.rows)?, total))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError` if the read fails or the row is invalid.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let query = visible().eq("id", id.as_i64()).range(0, 1);
        let selection = self.store.select(&query).await?;
        Ok(decode_rows::<OrderRow, Order>(selection.rows)?
            .into_iter()
            .next())
    }

    /// Lines of an order in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the read fails or a row is invalid.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let query = Query::new(Collection::OrderItems)
            .eq("order_id", order_id.as_i64())
            .order_by("id", Direction::Asc);
        let selection = self.store.select(&query).await?;
        decode_rows::<OrderItemRow, OrderItem>(selection.rows)
    }

    /// Insert a `placing` order header. It stays out of listings and reports
    /// until [`Self::confirm`] moves it to `pending`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails.
    pub async fn create_placing(
        &self,
        customer_id: CustomerId,
        sale_id: &SubjectId,
        total_amount: Decimal,
    ) -> Result<Order, RepositoryError> {
        let new_row = row([
            ("customer_id", json!(customer_id.as_i64())),
            ("sale_id", json!(sale_id.as_str())),
            ("status", json!(OrderStatus::Placing.as_str())),
            ("total_amount", json!(total_amount)),
        ]);
        let rows = self.store.insert(Collection::Orders, new_row).await?;
        returned_row::<OrderRow, Order>(rows)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails.
    pub async fn add_item(&self, item: NewOrderItem) -> Result<OrderItem, RepositoryError> {
        let new_row = row([
            ("order_id", json!(item.order_id.as_i64())),
            ("product_id", json!(item.product_id.as_i64())),
            ("quantity", json!(item.quantity)),
            ("price_at_order", json!(item.price_at_order)),
        ]);
        let rows = self.store.insert(Collection::OrderItems, new_row).await?;
        returned_row::<OrderItemRow, OrderItem>(rows)
    }

    /// Delete one order line, returning it only to the caller that removed it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails or the row is invalid.
    pub async fn remove_item(&self, id: OrderItemId) -> Result<Option<OrderItem>, RepositoryError> {
        let query = Query::new(Collection::OrderItems).eq("id", id.as_i64());
        let rows = self.store.delete(&query).await?;
        Ok(decode_rows::<OrderItemRow, OrderItem>(rows)?.into_iter().next())
    }

    /// Move a `placing` order to `pending`. `None` if it is no longer `placing`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails.
    pub async fn confirm(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        self.transition(id, OrderStatus::Placing, OrderStatus::Pending)
            .await
    }

    /// Move a `placing` order to `failed`, claiming it for unwinding.
    /// Exclusive with [`Self::confirm`]: at most one of them succeeds.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails.
    pub async fn claim_failed(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        self.transition(id, OrderStatus::Placing, OrderStatus::Failed)
            .await
    }

    async fn transition(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let query = Query::new(Collection::Orders)
            .eq("id", id.as_i64())
            .eq("status", from.as_str())
            .live();
        let rows = self
            .store
            .update(&query, row([("status", json!(to.as_str()))]))
            .await?;
        Ok(decode_rows::<OrderRow, Order>(rows)?.into_iter().next())
    }

    /// Whether the order is `failed`, soft-deleted or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the read fails.
    pub async fn is_failed(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let query = Query::new(Collection::Orders)
            .eq("id", id.as_i64())
            .eq("status", OrderStatus::Failed.as_str())
            .range(0, 1);
        Ok(!self.store.select(&query).await?.rows.is_empty())
    }

    /// Headers left behind by placements that never settled: `placing` ones
    /// created before `cutoff`, and `failed` ones not yet soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a read fails or a row is invalid.
    pub async fn unsettled(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, RepositoryError> {
        let stale = Query::new(Collection::Orders)
            .live()
            .eq("status", OrderStatus::Placing.as_str())
            .lt("created_at", cutoff.to_rfc3339_opts(SecondsFormat::Micros, true))
            .order_by("id", Direction::Asc);
        let unwinding = Query::new(Collection::Orders)
            .live()
            .eq("status", OrderStatus::Failed.as_str())
            .order_by("id", Direction::Asc);

        let mut orders = decode_rows::<OrderRow, Order>(self.store.select(&stale).await?.rows)?;
        orders.extend(decode_rows::<OrderRow, Order>(
            self.store.select(&unwinding).await?.rows,
        )?);
        Ok(orders)
    }

    /// Change the status of a visible order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails.
    pub async fn set_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let query = visible().eq("id", id.as_i64());
        let rows = self
            .store
            .update(&query, row([("status", json!(status.as_str()))]))
            .await?;
        Ok(decode_rows::<OrderRow, Order>(rows)?.into_iter().next())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails.
    pub async fn soft_delete(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let query = visible().eq("id", id.as_i64());
        let rows = self.store.update(&query, row([(DELETED_AT, now_value())])).await?;
        Ok(!rows.is_empty())
    }

    /// Soft-delete a `failed` order once it has been unwound. Repeating it
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails.
    pub async fn retire_failed(&self, id: OrderId) -> Result<(), RepositoryError> {
        let query = Query::new(Collection::Orders)
            .eq("id", id.as_i64())
            .eq("status", OrderStatus::Failed.as_str())
            .live();
        self.store.update(&query, row([(DELETED_AT, now_value())])).await?;
        Ok(())
    }

    /// Visible orders created within `[start, end]` (either bound optional).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the read fails or a row is invalid.
    pub async fn created_between(
        &self,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut query = visible();
        if let Some(start) = start {
            query = query.gte("created_at", start);
        }
        if let Some(end) = end {
            query = query.lte("created_at", end);
        }
        let query = query.order_by("created_at", Direction::Asc);

        let selection = self.store.select(&query).await?;
        decode_rows::<OrderRow, Order>(selection.rows)
    }
}

//! Customer repository.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use appejv_core::{CustomerId, PageRequest};

use super::{RepositoryError, decode_rows, now_value, returned_row};
use crate::models::Customer;
use crate::store::{Collection, DELETED_AT, DataStore, Direction, Query, Row, row};

#[derive(Debug, Deserialize)]
struct CustomerRow {
    id: i64,
    code: String,
    name: String,
    address: Option<String>,
    phone: Option<String>,
    assigned_sale: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = RepositoryError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CustomerId::new(row.id),
            code: row.code,
            name: row.name,
            address: row.address,
            phone: row.phone,
            assigned_sale: row.assigned_sale,
            created_at: row.created_at,
        })
    }
}

pub struct CustomerRepository<'a> {
    store: &'a dyn DataStore,
}

impl<'a> CustomerRepository<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn DataStore) -> Self {
        Self { store }
    }

    /// One page of live customers, newest first. `search` matches name, code and phone.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the read fails or a row is invalid.
    pub async fn list(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<(Vec<Customer>, u64), RepositoryError> {
        let mut query = Query::new(Collection::Customers).live();
        if let Some(term) = search {
            query = query.search(&["name", "code", "phone"], term);
        }
        let query = query
            .order_by("created_at", Direction::Desc)
            .order_by("id", Direction::Desc)
            .range(page.offset(), u64::from(page.limit()))
            .exact_count();

        let selection = self.store.select(&query).await?;
        let total = selection.total.unwrap_or(0);
        Ok((decode_rows::<CustomerRow, Customer>(selection.rows)?, total))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError` if the read fails or the row is invalid.
    pub async fn get(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let query = Query::new(Collection::Customers)
            .eq("id", id.as_i64())
            .live()
            .range(0, 1);
        let selection = self.store.select(&query).await?;
        Ok(decode_rows::<CustomerRow, Customer>(selection.rows)?
            .into_iter()
            .next())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Store(StoreError::Conflict)` on a duplicate code.
    pub async fn create(&self, new_row: Row) -> Result<Customer, RepositoryError> {
        let rows = self.store.insert(Collection::Customers, new_row).await?;
        returned_row::<CustomerRow, Customer>(rows)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails.
    pub async fn update(
        &self,
        id: CustomerId,
        patch: Row,
    ) -> Result<Option<Customer>, RepositoryError> {
        let query = Query::new(Collection::Customers).eq("id", id.as_i64()).live();
        let rows = self.store.update(&query, patch).await?;
        Ok(decode_rows::<CustomerRow, Customer>(rows)?.into_iter().next())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails.
    pub async fn soft_delete(&self, id: CustomerId) -> Result<bool, RepositoryError> {
        let query = Query::new(Collection::Customers).eq("id", id.as_i64()).live();
        let rows = self.store.update(&query, row([(DELETED_AT, now_value())])).await?;
        Ok(!rows.is_empty())
    }
}

//! Product repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use appejv_core::{PageRequest, ProductId};

use super::{RepositoryError, decode_rows, now_value, returned_row};
use crate::models::Product;
use crate::store::{Collection, DELETED_AT, DataStore, Direction, Query, Row, row};

#[derive(Debug, Deserialize)]
struct ProductRow {
    id: i64,
    code: String,
    name: String,
    unit: Option<String>,
    stock: i64,
    price: Decimal,
    category: Option<String>,
    category_id: Option<i64>,
    description: Option<String>,
    specifications: Option<String>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        if row.stock < 0 {
            return Err(RepositoryError::DataCorruption(format!(
                "product {} has negative stock {}",
                row.id, row.stock
            )));
        }
        if row.price.is_sign_negative() {
            return Err(RepositoryError::DataCorruption(format!(
                "product {} has negative price",
                row.id
            )));
        }

        Ok(Self {
            id: ProductId::new(row.id),
            code: row.code,
            name: row.name,
            unit: row.unit,
            stock: row.stock,
            price: row.price,
            category: row.category,
            category_id: row.category_id,
            description: row.description,
            specifications: row.specifications,
            image_url: row.image_url,
            created_at: row.created_at,
        })
    }
}

/// Filters for the public product listing.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    /// Matched against name and code.
    pub search: Option<String>,
}

/// Repository for catalogue products.
pub struct ProductRepository<'a> {
    store: &'a dyn DataStore,
}

impl<'a> ProductRepository<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn DataStore) -> Self {
        Self { store }
    }

    /// One page of live products, newest first, with the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the read fails or a row is invalid.
    pub async fn list(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> Result<(Vec<Product>, u64), RepositoryError> {
        let mut query = Query::new(Collection::Products).live();
        if let Some(category) = &filter.category {
            query = query.eq("category", category.as_str());
        }
        if let Some(search) = &filter.search {
            query = query.search(&["name", "code"], search);
        }
        let query = query
            .order_by("created_at", Direction::Desc)
            .order_by("id", Direction::Desc)
            .range(page.offset(), u64::from(page.limit()))
            .exact_count();

        let selection = self.store.select(&query).await?;
        let total = selection.total.unwrap_or(0);
        Ok((decode_rows::<ProductRow, Product>(selection.rows)?, total))
    }

    /// Fetch a live product. Soft-deleted products are `None`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the read fails or the row is invalid.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let query = Query::new(Collection::Products)
            .eq("id", id.as_i64())
            .live()
            .range(0, 1);
        let selection = self.store.select(&query).await?;
        Ok(decode_rows::<ProductRow, Product>(selection.rows)?
            .into_iter()
            .next())
    }

    /// Insert a product row built by `CreateProductRequest::into_row`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store(StoreError::Conflict)` on a duplicate code.
    pub async fn create(&self, new_row: Row) -> Result<Product, RepositoryError> {
        let rows = self.store.insert(Collection::Products, new_row).await?;
        returned_row::<ProductRow, Product>(rows)
    }

    /// Patch a live product; `None` if it does not exist or was deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails.
    pub async fn update(&self, id: ProductId, patch: Row) -> Result<Option<Product>, RepositoryError> {
        let query = Query::new(Collection::Products).eq("id", id.as_i64()).live();
        let rows = self.store.update(&query, patch).await?;
        Ok(decode_rows::<ProductRow, Product>(rows)?.into_iter().next())
    }

    /// Overwrite the stock level of a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails.
    pub async fn set_stock(&self, id: ProductId, stock: i64) -> Result<bool, RepositoryError> {
        let query = Query::new(Collection::Products).eq("id", id.as_i64());
        let rows = self.store.update(&query, row([("stock", json!(stock))])).await?;
        Ok(!rows.is_empty())
    }

    /// Mark a live product deleted. Returns `false` if there was none.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails.
    pub async fn soft_delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let query = Query::new(Collection::Products).eq("id", id.as_i64()).live();
        let rows = self.store.update(&query, row([(DELETED_AT, now_value())])).await?;
        Ok(!rows.is_empty())
    }

    /// All live products, lowest stock first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the read fails or a row is invalid.
    pub async fn inventory(&self) -> Result<Vec<Product>, RepositoryError> {
        self.by_stock(Query::new(Collection::Products).live()).await
    }

    /// Live products with `stock < threshold`, lowest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the read fails or a row is invalid.
    pub async fn low_stock(&self, threshold: i64) -> Result<Vec<Product>, RepositoryError> {
        self.by_stock(Query::new(Collection::Products).live().lt("stock", threshold))
            .await
    }

    async fn by_stock(&self, query: Query) -> Result<Vec<Product>, RepositoryError> {
        let query = query
            .order_by("stock", Direction::Asc)
            .order_by("id", Direction::Asc);
        let selection = self.store.select(&query).await?;
        decode_rows::<ProductRow, Product>(selection.rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn seed(store: &MemoryStore, code: &str, stock: i64, category: &str) {
        store.seed(
            Collection::Products,
            row([
                ("code", json!(code)),
                ("name", json!(format!("Product {code}"))),
                ("price", json!(12.5)),
                ("stock", json!(stock)),
                ("category", json!(category)),
            ]),
        );
    }

    #[tokio::test]
    async fn test_list_paginates_and_filters() {
        let store = MemoryStore::new();
        for i in 0..5 {
            seed(&store, &format!("F{i}"), 10, "fertilizer");
        }
        seed(&store, "S1", 10, "seeds");
        let repo = ProductRepository::new(&store);

        let filter = ProductFilter {
            category: Some("fertilizer".into()),
            search: None,
        };
        let (page, total) = repo
            .list(&filter, PageRequest::new(Some(2), Some(2)))
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_soft_deleted_product_is_hidden() {
        let store = MemoryStore::new();
        seed(&store, "P1", 4, "seeds");
        let repo = ProductRepository::new(&store);
        let id = ProductId::new(1);

        assert_eq!(repo.get(id).await.unwrap().unwrap().price, Decimal::new(125, 1));
        assert!(repo.soft_delete(id).await.unwrap());
        assert!(repo.get(id).await.unwrap().is_none());
        assert!(!repo.soft_delete(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_low_stock_orders_ascending() {
        let store = MemoryStore::new();
        seed(&store, "A", 9, "x");
        seed(&store, "B", 1, "x");
        seed(&store, "C", 10, "x");
        let repo = ProductRepository::new(&store);

        let low = repo.low_stock(10).await.unwrap();
        let codes: Vec<_> = low.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn test_negative_stock_is_corruption() {
        let store = MemoryStore::new();
        seed(&store, "BAD", -1, "x");
        let repo = ProductRepository::new(&store);
        assert!(matches!(
            repo.get(ProductId::new(1)).await,
            Err(RepositoryError::DataCorruption(_))
        ));
    }
}

//! Data Store contract.
//!
//! The gateway does not own its data. Profiles, products, customers, orders
//! and order items live in a remote store reached through the narrow
//! row-filtered contract defined here:
//!
//! - [`DataStore::select`] with equality, `is null`, range and search
//!   filters, ordering, offset/limit and an optional exact count
//! - [`DataStore::insert`], [`DataStore::update`] and [`DataStore::delete`],
//!   all returning the affected rows
//! - [`DataStore::adjust_stock`], an atomic conditional stock change
//!
//! [`PostgrestStore`] talks to a PostgREST endpoint over HTTP. `MemoryStore`
//! (behind the `test-util` feature) implements the same contract in-process.

mod postgrest;

#[cfg(any(test, feature = "test-util"))]
mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use appejv_core::ProductId;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{FailOn, MemoryStore};
pub use postgrest::PostgrestStore;

/// A row as exchanged with the Data Store: a JSON object keyed by column.
pub type Row = Map<String, Value>;

/// Column holding the soft-delete timestamp.
pub const DELETED_AT: &str = "deleted_at";

/// Named collections the gateway reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Profiles,
    Products,
    Customers,
    Orders,
    OrderItems,
}

impl Collection {
    /// Table name in the Data Store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Products => "products",
            Self::Customers => "customers",
            Self::Orders => "orders",
            Self::OrderItems => "order_items",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single row predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq(String, Value),
    /// `column <> value`; rows where `column` is null do not match.
    Neq(String, Value),
    /// `column IS NULL`
    IsNull(String),
    /// `column < value`
    Lt(String, Value),
    /// `column >= value`
    Gte(String, Value),
    /// `column <= value`
    Lte(String, Value),
    /// Case-insensitive substring match on any of `columns`.
    Search { columns: Vec<String>, term: String },
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub column: String,
    pub direction: Direction,
}

/// Row window: skip `offset` rows, return at most `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub offset: u64,
    pub limit: u64,
}

/// A filtered read (or the target of an update) against one collection.
///
/// ```rust
/// # use appejv_api::store::{Collection, Direction, Query};
/// let query = Query::new(Collection::Products)
///     .eq("category", "seeds")
///     .is_null("deleted_at")
///     .order_by("created_at", Direction::Desc)
///     .range(20, 20)
///     .exact_count();
/// assert_eq!(query.filters().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: Collection,
    filters: Vec<Filter>,
    sort: Vec<Sort>,
    range: Option<Range>,
    exact_count: bool,
}

impl Query {
    #[must_use]
    pub const fn new(collection: Collection) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            sort: Vec::new(),
            range: None,
            exact_count: false,
        }
    }

    #[must_use]
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn neq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Neq(column.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn is_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::IsNull(column.to_string()));
        self
    }

    /// Exclude soft-deleted rows.
    #[must_use]
    pub fn live(self) -> Self {
        self.is_null(DELETED_AT)
    }

    #[must_use]
    pub fn lt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lt(column.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(column.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn lte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lte(column.to_string(), value.into()));
        self
    }

    /// Case-insensitive substring search over `columns`. Blank terms are ignored.
    #[must_use]
    pub fn search(mut self, columns: &[&str], term: &str) -> Self {
        let term = term.trim();
        if !term.is_empty() {
            self.filters.push(Filter::Search {
                columns: columns.iter().map(ToString::to_string).collect(),
                term: term.to_string(),
            });
        }
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.sort.push(Sort {
            column: column.to_string(),
            direction,
        });
        self
    }

    #[must_use]
    pub const fn range(mut self, offset: u64, limit: u64) -> Self {
        self.range = Some(Range { offset, limit });
        self
    }

    /// Ask the store to report the total number of matching rows.
    #[must_use]
    pub const fn exact_count(mut self) -> Self {
        self.exact_count = true;
        self
    }

    #[must_use]
    pub const fn collection(&self) -> Collection {
        self.collection
    }

    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    #[must_use]
    pub fn sort(&self) -> &[Sort] {
        &self.sort
    }

    #[must_use]
    pub const fn window(&self) -> Option<Range> {
        self.range
    }

    #[must_use]
    pub const fn wants_count(&self) -> bool {
        self.exact_count
    }
}

/// Rows returned by [`DataStore::select`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub rows: Vec<Row>,
    /// Total matching rows ignoring the range; set when the query asked for it.
    pub total: Option<u64>,
}

/// Outcome of [`DataStore::adjust_stock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockAdjustment {
    /// The change was applied; `stock` is the new level.
    Applied { stock: i64 },
    /// The change would have taken stock below zero; nothing was written.
    Insufficient { available: i64 },
    /// No product with that id.
    NotFound,
}

/// Data Store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or did not answer in time.
    #[error("data store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with an error status.
    #[error("data store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A unique constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The response body could not be decoded.
    #[error("invalid data store response: {0}")]
    Decode(String),

    /// A conditional write kept losing to concurrent writers.
    #[error("stock update for product {0} lost too many races")]
    Contention(ProductId),
}

/// Row-filtered access to the remote Data Store.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Read rows matching `query`.
    async fn select(&self, query: &Query) -> Result<Selection, StoreError>;

    /// Insert one row and return what was stored (with generated columns).
    async fn insert(&self, collection: Collection, row: Row) -> Result<Vec<Row>, StoreError>;

    /// Apply `patch` to every row matching `query`'s filters; returns the updated rows.
    async fn update(&self, query: &Query, patch: Row) -> Result<Vec<Row>, StoreError>;

    /// Remove every row matching `query`'s filters; returns the removed rows.
    ///
    /// Only the caller that actually removed a row gets it back, so a row
    /// can be used as a claim on work tied to it.
    async fn delete(&self, query: &Query) -> Result<Vec<Row>, StoreError>;

    /// Add `delta` to a product's stock iff the result stays non-negative.
    ///
    /// Either the whole change lands or nothing is written.
    async fn adjust_stock(
        &self,
        product: ProductId,
        delta: i64,
    ) -> Result<StockAdjustment, StoreError>;
}

/// Build a [`Row`] from `(column, value)` pairs.
#[must_use]
pub fn row<const N: usize>(pairs: [(&str, Value); N]) -> Row {
    pairs
        .into_iter()
        .map(|(column, value)| (column.to_string(), value))
        .collect()
}

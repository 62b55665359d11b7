//! In-process [`DataStore`] for tests.
//!
//! Mirrors the PostgREST semantics the gateway relies on: generated `id` and
//! `created_at` columns, `deleted_at` defaulting to null, unique `code`
//! columns on customers and products, exact counts and offset/limit windows.
//! Failures and latency can be injected per operation.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};

use appejv_core::ProductId;

use super::{
    Collection, DELETED_AT, DataStore, Direction, Filter, Query, Row, Selection, StockAdjustment,
    StoreError,
};

/// Columns that must be unique within their collection.
const UNIQUE_COLUMNS: &[(Collection, &str)] =
    &[(Collection::Customers, "code"), (Collection::Products, "code")];

/// An operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Select(Collection),
    Insert(Collection),
    Update(Collection),
    Delete(Collection),
    AdjustStock,
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<Collection, Vec<Row>>,
    next_id: HashMap<Collection, i64>,
    /// Operation and the number of calls that still succeed before it fails.
    failures: Vec<(FailOn, usize)>,
    latency: Duration,
}

impl Tables {
    /// Consume one call of `op`; returns an error once its budget is spent.
    fn check_failure(&mut self, op: FailOn) -> Result<(), StoreError> {
        for (target, remaining) in &mut self.failures {
            if *target == op {
                if *remaining == 0 {
                    return Err(StoreError::Unavailable(format!("injected failure on {op:?}")));
                }
                *remaining -= 1;
            }
        }
        Ok(())
    }

    fn table(&mut self, collection: Collection) -> &mut Vec<Row> {
        self.rows.entry(collection).or_default()
    }

    fn store(&mut self, collection: Collection, mut row: Row) -> Result<Row, StoreError> {
        if !row.contains_key("id") {
            let next = self.next_id.entry(collection).or_insert(0);
            *next += 1;
            row.insert("id".to_string(), json!(*next));
        }
        row.entry("created_at")
            .or_insert_with(|| json!(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)));
        row.entry(DELETED_AT).or_insert(Value::Null);

        let table = self.table(collection);
        for (unique_collection, column) in UNIQUE_COLUMNS {
            if *unique_collection != collection {
                continue;
            }
            let Some(value) = row.get(*column).filter(|v| !v.is_null()) else {
                continue;
            };
            if table.iter().any(|existing| existing.get(*column) == Some(value)) {
                return Err(StoreError::Conflict(format!(
                    "duplicate key value violates unique constraint on {collection}.{column}"
                )));
            }
        }

        table.push(row.clone());
        Ok(row)
    }
}

/// Thread-safe in-memory Data Store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row directly, bypassing injected failures.
    ///
    /// # Panics
    ///
    /// Panics if the row violates a unique column; seeds are test fixtures.
    #[allow(clippy::expect_used)]
    pub fn seed(&self, collection: Collection, row: Row) -> Row {
        self.tables
            .lock()
            .store(collection, row)
            .expect("seed row violates a unique column")
    }

    /// Snapshot of every row in `collection`, soft-deleted ones included.
    #[must_use]
    pub fn rows(&self, collection: Collection) -> Vec<Row> {
        self.tables
            .lock()
            .rows
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Find a row by its `id` column.
    #[must_use]
    pub fn find(&self, collection: Collection, id: impl Into<Value>) -> Option<Row> {
        let id = id.into();
        self.rows(collection)
            .into_iter()
            .find(|row| row.get("id").is_some_and(|v| text(v) == text(&id)))
    }

    /// Let `successes` calls of `op` through, then fail every later one.
    pub fn fail_after(&self, op: FailOn, successes: usize) {
        self.tables.lock().failures.push((op, successes));
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.tables.lock().failures.clear();
    }

    /// Delay every operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.tables.lock().latency = latency;
    }

    async fn delay(&self) {
        let latency = self.tables.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn select(&self, query: &Query) -> Result<Selection, StoreError> {
        self.delay().await;
        let mut tables = self.tables.lock();
        tables.check_failure(FailOn::Select(query.collection()))?;

        let mut rows: Vec<Row> = tables
            .table(query.collection())
            .iter()
            .filter(|row| matches_all(row, query.filters()))
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            query
                .sort()
                .iter()
                .map(|sort| {
                    let ordering = compare_nulls_last(a.get(&sort.column), b.get(&sort.column));
                    match sort.direction {
                        Direction::Asc => ordering,
                        Direction::Desc => ordering.reverse(),
                    }
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        });

        let total = query.wants_count().then_some(rows.len() as u64);
        if let Some(range) = query.window() {
            let offset = usize::try_from(range.offset).unwrap_or(usize::MAX);
            let limit = usize::try_from(range.limit).unwrap_or(usize::MAX);
            rows = rows.into_iter().skip(offset).take(limit).collect();
        }

        Ok(Selection { rows, total })
    }

    async fn insert(&self, collection: Collection, row: Row) -> Result<Vec<Row>, StoreError> {
        self.delay().await;
        let mut tables = self.tables.lock();
        tables.check_failure(FailOn::Insert(collection))?;
        Ok(vec![tables.store(collection, row)?])
    }

    async fn update(&self, query: &Query, patch: Row) -> Result<Vec<Row>, StoreError> {
        self.delay().await;
        let mut tables = self.tables.lock();
        tables.check_failure(FailOn::Update(query.collection()))?;

        let mut updated = Vec::new();
        for row in tables.table(query.collection()) {
            if matches_all(row, query.filters()) {
                for (column, value) in &patch {
                    row.insert(column.clone(), value.clone());
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        self.delay().await;
        let mut tables = self.tables.lock();
        tables.check_failure(FailOn::Delete(query.collection()))?;

        let (removed, kept): (Vec<Row>, Vec<Row>) = std::mem::take(tables.table(query.collection()))
            .into_iter()
            .partition(|row| matches_all(row, query.filters()));
        *tables.table(query.collection()) = kept;
        Ok(removed)
    }

    async fn adjust_stock(
        &self,
        product: ProductId,
        delta: i64,
    ) -> Result<StockAdjustment, StoreError> {
        self.delay().await;
        let mut tables = self.tables.lock();
        tables.check_failure(FailOn::AdjustStock)?;

        let id = json!(product.as_i64());
        let Some(row) = tables
            .table(Collection::Products)
            .iter_mut()
            .find(|row| row.get("id") == Some(&id))
        else {
            return Ok(StockAdjustment::NotFound);
        };

        let stock = row
            .get("stock")
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::Decode(format!("product {product} has no integer stock")))?;

        match stock.checked_add(delta).filter(|next| *next >= 0) {
            Some(next) => {
                row.insert("stock".to_string(), json!(next));
                Ok(StockAdjustment::Applied { stock: next })
            }
            None => Ok(StockAdjustment::Insufficient { available: stock }),
        }
    }
}

// =============================================================================
// Filter evaluation
// =============================================================================

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| matches(row, filter))
}

fn matches(row: &Row, filter: &Filter) -> bool {
    let present = |column: &str| row.get(column).filter(|v| !v.is_null());

    match filter {
        Filter::Eq(column, value) => present(column).is_some_and(|v| text(v) == text(value)),
        Filter::Neq(column, value) => present(column).is_some_and(|v| text(v) != text(value)),
        Filter::IsNull(column) => present(column).is_none(),
        Filter::Lt(column, value) => {
            present(column).is_some_and(|v| compare(v, value) == Some(Ordering::Less))
        }
        Filter::Gte(column, value) => present(column)
            .is_some_and(|v| matches!(compare(v, value), Some(Ordering::Greater | Ordering::Equal))),
        Filter::Lte(column, value) => present(column)
            .is_some_and(|v| matches!(compare(v, value), Some(Ordering::Less | Ordering::Equal))),
        Filter::Search { columns, term } => {
            let needle = term.to_lowercase();
            columns.iter().any(|column| {
                present(column).is_some_and(|v| text(v).to_lowercase().contains(&needle))
            })
        }
    }
}

/// Text form used for equality, as PostgREST compares query-string values.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Order numbers numerically, timestamps chronologically, anything else as text.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (as_timestamp(a), as_timestamp(b)) {
        return Some(x.cmp(&y));
    }
    Some(text(a).cmp(&text(b)))
}

fn compare_nulls_last(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

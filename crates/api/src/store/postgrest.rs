//! PostgREST client for the Data Store.
//!
//! Queries are rendered in PostgREST's URL syntax (`column=op.value`,
//! `order=`, `offset=`/`limit=`); exact counts are requested with
//! `Prefer: count=exact` and read back from `Content-Range`.

use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, HeaderMap};
use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};
use url::Url;

use appejv_core::ProductId;

use super::{
    Collection, DataStore, Direction, Filter, Query, Row, Selection, StockAdjustment, StoreError,
};
use crate::config::DataStoreConfig;

/// Path of the REST API relative to the project URL.
const REST_PATH: &str = "rest/v1/";

/// Postgres error code for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// Compare-and-swap attempts before [`StoreError::Contention`].
const MAX_STOCK_ATTEMPTS: usize = 5;

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Data Store client speaking PostgREST.
#[derive(Clone)]
pub struct PostgrestStore {
    client: Client,
    rest_url: Url,
    api_key: SecretString,
}

impl std::fmt::Debug for PostgrestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestStore")
            .field("rest_url", &self.rest_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl PostgrestStore {
    /// Create a client for the project at `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the HTTP client cannot be built
    /// or the REST URL cannot be derived from the base URL.
    pub fn new(config: &DataStoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        let rest_url = config
            .base_url
            .join(REST_PATH)
            .map_err(|e| StoreError::Unavailable(format!("invalid data store URL: {e}")))?;

        Ok(Self {
            client,
            rest_url,
            api_key: config.api_key.clone(),
        })
    }

    fn collection_url(&self, collection: Collection) -> Result<Url, StoreError> {
        self.rest_url
            .join(collection.as_str())
            .map_err(|e| StoreError::Unavailable(format!("invalid collection URL: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let key = self.api_key.expose_secret();
        self.client
            .request(method, url)
            .header("apikey", key)
            .bearer_auth(key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Unavailable("request timed out".to_string())
            } else {
                StoreError::Unavailable(e.to_string())
            }
        })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status, &body))
    }

    async fn rows(response: Response) -> Result<Vec<Row>, StoreError> {
        response
            .json::<Vec<Row>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Read a product's current stock level.
    async fn current_stock(&self, product: ProductId) -> Result<Option<i64>, StoreError> {
        let query = Query::new(Collection::Products)
            .eq("id", product.as_i64())
            .range(0, 1);
        let mut url = self.collection_url(Collection::Products)?;
        url.query_pairs_mut().append_pair("select", "id,stock");
        render_query(&query, &mut url, true);

        let response = self.send(self.request(Method::GET, url)).await?;
        let rows = Self::rows(response).await?;

        rows.first()
            .map(|row| {
                row.get("stock").and_then(Value::as_i64).ok_or_else(|| {
                    StoreError::Decode(format!("product {product} has no integer stock"))
                })
            })
            .transpose()
    }
}

#[async_trait]
impl DataStore for PostgrestStore {
    #[instrument(skip(self, query), fields(collection = %query.collection()))]
    async fn select(&self, query: &Query) -> Result<Selection, StoreError> {
        let mut url = self.collection_url(query.collection())?;
        url.query_pairs_mut().append_pair("select", "*");
        render_query(query, &mut url, true);

        let mut request = self.request(Method::GET, url);
        if query.wants_count() {
            request = request.header("Prefer", "count=exact");
        }

        let response = self.send(request).await?;
        let total = if query.wants_count() {
            Some(content_range_total(response.headers()).ok_or_else(|| {
                StoreError::Decode("missing or malformed Content-Range".to_string())
            })?)
        } else {
            None
        };
        let rows = Self::rows(response).await?;

        debug!(rows = rows.len(), ?total, "Selected rows");
        Ok(Selection { rows, total })
    }

    #[instrument(skip(self, row), fields(collection = %collection))]
    async fn insert(&self, collection: Collection, row: Row) -> Result<Vec<Row>, StoreError> {
        let url = self.collection_url(collection)?;
        let request = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(&row);

        let response = self.send(request).await?;
        Self::rows(response).await
    }

    #[instrument(skip(self, query, patch), fields(collection = %query.collection()))]
    async fn update(&self, query: &Query, patch: Row) -> Result<Vec<Row>, StoreError> {
        let mut url = self.collection_url(query.collection())?;
        render_query(query, &mut url, false);

        let request = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&patch);

        let response = self.send(request).await?;
        Self::rows(response).await
    }

    #[instrument(skip(self, query), fields(collection = %query.collection()))]
    async fn delete(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        let mut url = self.collection_url(query.collection())?;
        render_query(query, &mut url, false);

        let request = self
            .request(Method::DELETE, url)
            .header("Prefer", "return=representation");

        let response = self.send(request).await?;
        Self::rows(response).await
    }

    /// Optimistic compare-and-swap on `stock`.
    ///
    /// Each attempt reads the current level and patches with
    /// `stock=eq.<observed>`; an empty result means another writer got there
    /// first, and the read is retried.
    #[instrument(skip(self), fields(product_id = %product))]
    async fn adjust_stock(
        &self,
        product: ProductId,
        delta: i64,
    ) -> Result<StockAdjustment, StoreError> {
        for attempt in 1..=MAX_STOCK_ATTEMPTS {
            let Some(stock) = self.current_stock(product).await? else {
                return Ok(StockAdjustment::NotFound);
            };

            let Some(next) = stock.checked_add(delta).filter(|next| *next >= 0) else {
                return Ok(StockAdjustment::Insufficient { available: stock });
            };

            let query = Query::new(Collection::Products)
                .eq("id", product.as_i64())
                .eq("stock", stock);
            let updated = self
                .update(&query, super::row([("stock", json!(next))]))
                .await?;

            if !updated.is_empty() {
                debug!(stock, next, attempt, "Stock adjusted");
                return Ok(StockAdjustment::Applied { stock: next });
            }

            debug!(attempt, "Stock changed concurrently, retrying");
        }

        warn!(attempts = MAX_STOCK_ATTEMPTS, "Giving up on stock update");
        Err(StoreError::Contention(product))
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// Append `query`'s filters (and, when `with_window`, ordering and range) to `url`.
fn render_query(query: &Query, url: &mut Url, with_window: bool) {
    let mut pairs = url.query_pairs_mut();

    for filter in query.filters() {
        match filter {
            Filter::Eq(column, value) => {
                pairs.append_pair(column, &format!("eq.{}", render_value(value)));
            }
            Filter::Neq(column, value) => {
                pairs.append_pair(column, &format!("neq.{}", render_value(value)));
            }
            Filter::IsNull(column) => {
                pairs.append_pair(column, "is.null");
            }
            Filter::Lt(column, value) => {
                pairs.append_pair(column, &format!("lt.{}", render_value(value)));
            }
            Filter::Gte(column, value) => {
                pairs.append_pair(column, &format!("gte.{}", render_value(value)));
            }
            Filter::Lte(column, value) => {
                pairs.append_pair(column, &format!("lte.{}", render_value(value)));
            }
            Filter::Search { columns, term } => {
                pairs.append_pair("or", &render_search(columns, term));
            }
        }
    }

    if !with_window {
        return;
    }

    if !query.sort().is_empty() {
        let order = query
            .sort()
            .iter()
            .map(|sort| {
                let direction = match sort.direction {
                    Direction::Asc => "asc",
                    Direction::Desc => "desc",
                };
                format!("{}.{direction}", sort.column)
            })
            .collect::<Vec<_>>()
            .join(",");
        pairs.append_pair("order", &order);
    }

    if let Some(range) = query.window() {
        pairs.append_pair("offset", &range.offset.to_string());
        pairs.append_pair("limit", &range.limit.to_string());
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `(a.ilike."*term*",b.ilike."*term*")` with the term quoted so commas and
/// parentheses inside it are not read as syntax.
fn render_search(columns: &[String], term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('"', "\\\"");
    let clauses = columns
        .iter()
        .map(|column| format!("{column}.ilike.\"*{escaped}*\""))
        .collect::<Vec<_>>()
        .join(",");
    format!("({clauses})")
}

/// Total from `Content-Range: 0-19/57` (or `*/0`).
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)?
        .to_str()
        .ok()?
        .rsplit_once('/')?
        .1
        .trim()
        .parse()
        .ok()
}

fn classify_error(status: u16, body: &str) -> StoreError {
    let parsed = serde_json::from_str::<PostgrestErrorBody>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.message.clone())
        .unwrap_or_else(|| body.chars().take(200).collect());

    if parsed
        .as_ref()
        .and_then(|b| b.code.as_deref())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
    {
        return StoreError::Conflict(message);
    }

    warn!(status, %message, "Data store rejected request");
    StoreError::Rejected { status, message }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn rendered(query: &Query, with_window: bool) -> Vec<(String, String)> {
        let mut url = Url::parse("https://abc.supabase.co/rest/v1/products").unwrap();
        render_query(query, &mut url, with_window);
        url.query_pairs().into_owned().collect()
    }

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn test_render_filters_order_and_range() {
        let query = Query::new(Collection::Products)
            .eq("category", "seeds")
            .is_null("deleted_at")
            .lt("stock", 10)
            .order_by("created_at", Direction::Desc)
            .order_by("id", Direction::Asc)
            .range(40, 20);

        assert_eq!(
            rendered(&query, true),
            vec![
                pair("category", "eq.seeds"),
                pair("deleted_at", "is.null"),
                pair("stock", "lt.10"),
                pair("order", "created_at.desc,id.asc"),
                pair("offset", "40"),
                pair("limit", "20"),
            ]
        );
    }

    #[test]
    fn test_render_neq() {
        let query = Query::new(Collection::Orders)
            .live()
            .neq("status", "placing");
        assert_eq!(
            rendered(&query, true),
            vec![pair("deleted_at", "is.null"), pair("status", "neq.placing")]
        );
    }

    #[test]
    fn test_update_target_ignores_window() {
        let query = Query::new(Collection::Products)
            .eq("id", 7)
            .order_by("id", Direction::Asc)
            .range(0, 1);
        assert_eq!(rendered(&query, false), vec![pair("id", "eq.7")]);
    }

    #[test]
    fn test_render_search_quotes_term() {
        let query = Query::new(Collection::Customers).search(&["name", "code"], "a,b\"c");
        assert_eq!(
            rendered(&query, true),
            vec![pair("or", r#"(name.ilike."*a,b\"c*",code.ilike."*a,b\"c*")"#)]
        );
    }

    #[test]
    fn test_content_range_total() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_RANGE, HeaderValue::from_static("0-19/57"));
        assert_eq!(content_range_total(&headers), Some(57));

        headers.insert(CONTENT_RANGE, HeaderValue::from_static("*/0"));
        assert_eq!(content_range_total(&headers), Some(0));

        headers.insert(CONTENT_RANGE, HeaderValue::from_static("0-19/*"));
        assert_eq!(content_range_total(&headers), None);
    }

    #[test]
    fn test_classify_unique_violation_as_conflict() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#;
        assert!(matches!(classify_error(409, body), StoreError::Conflict(_)));

        let body = r#"{"code":"42P01","message":"relation does not exist"}"#;
        assert!(matches!(
            classify_error(404, body),
            StoreError::Rejected { status: 404, .. }
        ));

        assert!(matches!(
            classify_error(502, "<html>bad gateway</html>"),
            StoreError::Rejected { status: 502, .. }
        ));
    }
}

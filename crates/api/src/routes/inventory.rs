//! Stock levels and manual adjustments.

use axum::{Router, extract::State, routing::{get, post}};
use serde::{Deserialize, Serialize};

use appejv_core::ProductId;

use super::DataResponse;
use crate::db::{ProductRepository, RepositoryError};
use crate::deadline::Deadline;
use crate::error::{AppError, Result};
use crate::extract::{Json, Query};
use crate::middleware::RequireRole;
use crate::models::{InventoryAdjustRequest, Product};
use crate::services::auth::Administrators;
use crate::state::AppState;
use crate::store::StockAdjustment;

/// Threshold used by `/inventory/low-stock` when none is given.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/inventory", get(list_inventory))
        .route("/inventory/low-stock", get(low_stock))
        .route("/inventory/adjust", post(adjust_inventory))
}

/// Every live product, lowest stock first.
pub async fn list_inventory(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(..): RequireRole<Administrators>,
) -> Result<Json<DataResponse<Vec<Product>>>> {
    let products = deadline
        .run(ProductRepository::new(state.store()).inventory())
        .await??;
    Ok(Json(DataResponse::new(products)))
}

#[derive(Debug, Default, Deserialize)]
pub struct LowStockQuery {
    pub threshold: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LowStockResponse {
    pub data: Vec<Product>,
    pub threshold: i64,
    pub count: usize,
}

/// Live products with stock strictly below `threshold`.
pub async fn low_stock(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(..): RequireRole<Administrators>,
    Query(query): Query<LowStockQuery>,
) -> Result<Json<LowStockResponse>> {
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
    let data = deadline
        .run(ProductRepository::new(state.store()).low_stock(threshold))
        .await??;

    Ok(Json(LowStockResponse {
        count: data.len(),
        threshold,
        data,
    }))
}

#[derive(Debug, Serialize)]
pub struct AdjustResponse {
    pub data: Product,
    pub message: &'static str,
}

/// Add a signed delta to a product's stock.
///
/// The change is a single conditional write: it lands only if stock stays
/// non-negative, so concurrent adjustments and orders cannot drive it below zero.
pub async fn adjust_inventory(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(user, ..): RequireRole<Administrators>,
    Json(request): Json<InventoryAdjustRequest>,
) -> Result<Json<AdjustResponse>> {
    if request.quantity == 0 {
        return Err(AppError::BadRequest("quantity must not be zero".to_string()));
    }
    let id = request.product_id;

    let mut product = deadline
        .run(ProductRepository::new(state.store()).get(id))
        .await??
        .ok_or_else(|| product_not_found(id))?;

    let outcome = deadline
        .run(state.store().adjust_stock(id, request.quantity))
        .await?
        .map_err(RepositoryError::from)?;

    match outcome {
        StockAdjustment::Applied { stock } => {
            tracing::info!(
                product_id = %id,
                delta = request.quantity,
                stock,
                reason = request.reason.as_deref().unwrap_or(""),
                by = %user.identity.subject,
                "Inventory adjusted"
            );
            product.stock = stock;
            Ok(Json(AdjustResponse {
                data: product,
                message: "Inventory adjusted",
            }))
        }
        StockAdjustment::Insufficient { available } => Err(AppError::BadRequest(format!(
            "Stock cannot go below zero (available {available})"
        ))),
        StockAdjustment::NotFound => Err(product_not_found(id)),
    }
}

fn product_not_found(id: ProductId) -> AppError {
    AppError::NotFound(format!("Product {id} not found"))
}

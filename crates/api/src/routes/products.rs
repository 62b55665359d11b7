//! Product catalogue.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;

use appejv_core::{PageRequest, ProductId};

use super::{DataResponse, ListResponse, MessageResponse};
use crate::db::{ProductFilter, ProductRepository};
use crate::deadline::Deadline;
use crate::error::{AppError, Result};
use crate::extract::{Json, Path, Query};
use crate::middleware::RequireRole;
use crate::models::{CreateProductRequest, Product, UpdateProductRequest};
use crate::services::auth::Administrators;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub search: Option<String>,
}

/// Live products, newest first.
pub async fn list_products(
    State(state): State<AppState>,
    deadline: Deadline,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ListResponse<Product>>> {
    let page = PageRequest::new(query.page, query.limit);
    let filter = ProductFilter {
        category: query.category.filter(|c| !c.trim().is_empty()),
        search: query.search,
    };

    let (data, total) = deadline
        .run(ProductRepository::new(state.store()).list(&filter, page))
        .await??;

    Ok(Json(ListResponse {
        data,
        pagination: page.paginate(total),
    }))
}

/// A soft-deleted product is not found, however often it is asked for.
pub async fn get_product(
    State(state): State<AppState>,
    deadline: Deadline,
    Path(id): Path<ProductId>,
) -> Result<Json<DataResponse<Product>>> {
    let product = deadline
        .run(ProductRepository::new(state.store()).get(id))
        .await??
        .ok_or_else(|| product_not_found(id))?;
    Ok(Json(DataResponse::new(product)))
}

pub async fn create_product(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(user, ..): RequireRole<Administrators>,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<DataResponse<Product>>)> {
    let new_row = request.into_row().map_err(AppError::BadRequest)?;
    let product = deadline
        .run(ProductRepository::new(state.store()).create(new_row))
        .await??;

    tracing::info!(product_id = %product.id, code = %product.code, by = %user.identity.subject, "Product created");
    Ok((StatusCode::CREATED, Json(DataResponse::new(product))))
}

pub async fn update_product(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(user, ..): RequireRole<Administrators>,
    Path(id): Path<ProductId>,
    Json(request): Json<UpdateProductRequest>,
) -> Result<Json<DataResponse<Product>>> {
    let patch = request.into_patch().map_err(AppError::BadRequest)?;
    let product = deadline
        .run(ProductRepository::new(state.store()).update(id, patch))
        .await??
        .ok_or_else(|| product_not_found(id))?;

    tracing::info!(product_id = %id, by = %user.identity.subject, "Product updated");
    Ok(Json(DataResponse::new(product)))
}

pub async fn delete_product(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(user, ..): RequireRole<Administrators>,
    Path(id): Path<ProductId>,
) -> Result<Json<MessageResponse>> {
    let deleted = deadline
        .run(ProductRepository::new(state.store()).soft_delete(id))
        .await??;
    if !deleted {
        return Err(product_not_found(id));
    }

    tracing::info!(product_id = %id, by = %user.identity.subject, "Product deleted");
    Ok(Json(MessageResponse::new("Product deleted")))
}

fn product_not_found(id: ProductId) -> AppError {
    AppError::NotFound(format!("Product {id} not found"))
}

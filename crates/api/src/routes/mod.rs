//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness check
//!
//! # Public
//! GET    /api/v1/products                 - Product listing (category, search)
//! GET    /api/v1/products/{id}            - Product detail
//!
//! # Authenticated
//! GET    /api/v1/profile                  - Caller's profile
//!
//! # Sales staff (sale, admin, sale_admin)
//! GET    /api/v1/customers                - Customer listing (search)
//! POST   /api/v1/customers                - Create customer
//! GET    /api/v1/customers/{id}           - Customer detail
//! PUT    /api/v1/customers/{id}           - Update customer
//! GET    /api/v1/orders                   - Order listing (status, customer_id)
//! POST   /api/v1/orders                   - Place order
//! GET    /api/v1/orders/{id}              - Order with items
//! PUT    /api/v1/orders/{id}              - Change order status
//!
//! # Administrators (admin, sale_admin)
//! POST   /api/v1/products                 - Create product
//! PUT    /api/v1/products/{id}            - Update product
//! DELETE /api/v1/products/{id}            - Soft-delete product
//! DELETE /api/v1/customers/{id}           - Soft-delete customer
//! DELETE /api/v1/orders/{id}              - Soft-delete order
//! GET    /api/v1/inventory                - Stock levels, lowest first
//! GET    /api/v1/inventory/low-stock      - Products below a threshold
//! POST   /api/v1/inventory/adjust         - Atomic stock adjustment
//! GET    /api/v1/reports/sales            - Sales totals for a date range
//! ```

pub mod customers;
pub mod health;
pub mod inventory;
pub mod orders;
pub mod products;
pub mod profile;
pub mod reports;

use std::time::Duration;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
};
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultOnResponse, OnResponse, TraceLayer},
};
use tracing::Span;

use appejv_core::Pagination;

use crate::error::AppError;
use crate::middleware::{
    deadline_middleware, rate_limit_middleware, request_id::REQUEST_ID_HEADER,
    request_id_middleware,
};
use crate::state::AppState;

/// `{"data": ...}`
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub const fn new(data: T) -> Self {
        Self { data }
    }
}

/// `{"data": [...], "pagination": {...}}`
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

/// `{"message": ...}` for deletions.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// All `/api/v1` routes, without middleware.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(products::router())
        .merge(profile::router())
        .merge(customers::router())
        .merge(orders::router())
        .merge(inventory::router())
        .merge(reports::router())
}

/// The complete application: routes, middleware and state.
///
/// Layers, outermost first: CORS, tracing, request ID, rate limit, deadline.
/// Sentry layers are added by the binary around this router.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api_routes())
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), deadline_middleware))
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        subject = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record("latency_ms", latency.as_millis() as u64);
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring unusable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
        .expose_headers([
            HeaderName::from_static(REQUEST_ID_HEADER),
            header::RETRY_AFTER,
        ])
        .allow_credentials(true)
}

async fn not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

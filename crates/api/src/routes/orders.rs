//! Orders: listing, placement and status changes.

use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::Deserialize;

use appejv_core::{CustomerId, OrderId, OrderStatus, PageRequest};

use super::{DataResponse, ListResponse, MessageResponse};
use crate::db::{OrderFilter, OrderRepository};
use crate::deadline::Deadline;
use crate::error::{AppError, Result};
use crate::extract::{Json, Path, Query};
use crate::middleware::RequireRole;
use crate::models::{CreateOrderRequest, Order, OrderDetails, UpdateOrderRequest};
use crate::services::auth::{Administrators, SalesStaff};
use crate::services::orders::OrderPlacement;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route(
            "/orders/{id}",
            get(get_order).put(update_order).delete(delete_order),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<OrderStatus>,
    pub customer_id: Option<CustomerId>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(..): RequireRole<SalesStaff>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<ListResponse<Order>>> {
    let page = PageRequest::new(query.page, query.limit);
    let filter = OrderFilter {
        status: query.status,
        customer_id: query.customer_id,
    };
    let (data, total) = deadline
        .run(OrderRepository::new(state.store()).list(filter, page))
        .await??;

    Ok(Json(ListResponse {
        data,
        pagination: page.paginate(total),
    }))
}

/// The order header with its lines.
pub async fn get_order(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(..): RequireRole<SalesStaff>,
    Path(id): Path<OrderId>,
) -> Result<Json<DataResponse<OrderDetails>>> {
    let repo = OrderRepository::new(state.store());
    let order = deadline
        .run(repo.get(id))
        .await??
        .ok_or_else(|| order_not_found(id))?;
    let items = deadline.run(repo.items(id)).await??;

    Ok(Json(DataResponse::new(OrderDetails { order, items })))
}

/// Place an order on behalf of the calling agent.
pub async fn create_order(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(user, ..): RequireRole<SalesStaff>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<DataResponse<OrderDetails>>)> {
    let placement = OrderPlacement::new(
        state.store_handle(),
        state.settings().placement,
        deadline,
    );
    let details = placement
        .place(request.customer_id, &user.identity.subject, &request.items)
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse::new(details))))
}

pub async fn update_order(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(user, ..): RequireRole<SalesStaff>,
    Path(id): Path<OrderId>,
    Json(request): Json<UpdateOrderRequest>,
) -> Result<Json<DataResponse<Order>>> {
    if !request.status.is_assignable() {
        return Err(AppError::BadRequest(format!(
            "Status '{}' cannot be set directly",
            request.status
        )));
    }
    let order = deadline
        .run(OrderRepository::new(state.store()).set_status(id, request.status))
        .await??
        .ok_or_else(|| order_not_found(id))?;

    tracing::info!(order_id = %id, status = %order.status, by = %user.identity.subject, "Order status changed");
    Ok(Json(DataResponse::new(order)))
}

pub async fn delete_order(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(user, ..): RequireRole<Administrators>,
    Path(id): Path<OrderId>,
) -> Result<Json<MessageResponse>> {
    let deleted = deadline
        .run(OrderRepository::new(state.store()).soft_delete(id))
        .await??;
    if !deleted {
        return Err(order_not_found(id));
    }

    tracing::info!(order_id = %id, by = %user.identity.subject, "Order deleted");
    Ok(Json(MessageResponse::new("Order deleted")))
}

fn order_not_found(id: OrderId) -> AppError {
    AppError::NotFound(format!("Order {id} not found"))
}

//! Customers managed by sales staff.

use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::Deserialize;

use appejv_core::{CustomerId, PageRequest};

use super::{DataResponse, ListResponse, MessageResponse};
use crate::db::CustomerRepository;
use crate::deadline::Deadline;
use crate::error::{AppError, Result};
use crate::extract::{Json, Path, Query};
use crate::middleware::RequireRole;
use crate::models::{CreateCustomerRequest, Customer, UpdateCustomerRequest};
use crate::services::auth::{Administrators, SalesStaff};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/customers", get(list_customers).post(create_customer))
        .route(
            "/customers/{id}",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Matches name, code or phone.
    pub search: Option<String>,
}

pub async fn list_customers(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(..): RequireRole<SalesStaff>,
    Query(query): Query<CustomerListQuery>,
) -> Result<Json<ListResponse<Customer>>> {
    let page = PageRequest::new(query.page, query.limit);
    let (data, total) = deadline
        .run(CustomerRepository::new(state.store()).list(query.search.as_deref(), page))
        .await??;

    Ok(Json(ListResponse {
        data,
        pagination: page.paginate(total),
    }))
}

pub async fn get_customer(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(..): RequireRole<SalesStaff>,
    Path(id): Path<CustomerId>,
) -> Result<Json<DataResponse<Customer>>> {
    let customer = deadline
        .run(CustomerRepository::new(state.store()).get(id))
        .await??
        .ok_or_else(|| customer_not_found(id))?;
    Ok(Json(DataResponse::new(customer)))
}

pub async fn create_customer(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(user, ..): RequireRole<SalesStaff>,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<DataResponse<Customer>>)> {
    let new_row = request.into_row().map_err(AppError::BadRequest)?;
    let customer = deadline
        .run(CustomerRepository::new(state.store()).create(new_row))
        .await??;

    tracing::info!(customer_id = %customer.id, by = %user.identity.subject, "Customer created");
    Ok((StatusCode::CREATED, Json(DataResponse::new(customer))))
}

pub async fn update_customer(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(..): RequireRole<SalesStaff>,
    Path(id): Path<CustomerId>,
    Json(request): Json<UpdateCustomerRequest>,
) -> Result<Json<DataResponse<Customer>>> {
    let patch = request.into_patch().map_err(AppError::BadRequest)?;
    let customer = deadline
        .run(CustomerRepository::new(state.store()).update(id, patch))
        .await??
        .ok_or_else(|| customer_not_found(id))?;
    Ok(Json(DataResponse::new(customer)))
}

pub async fn delete_customer(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(user, ..): RequireRole<Administrators>,
    Path(id): Path<CustomerId>,
) -> Result<Json<MessageResponse>> {
    let deleted = deadline
        .run(CustomerRepository::new(state.store()).soft_delete(id))
        .await??;
    if !deleted {
        return Err(customer_not_found(id));
    }

    tracing::info!(customer_id = %id, by = %user.identity.subject, "Customer deleted");
    Ok(Json(MessageResponse::new("Customer deleted")))
}

fn customer_not_found(id: CustomerId) -> AppError {
    AppError::NotFound(format!("Customer {id} not found"))
}

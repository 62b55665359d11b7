//! Sales reporting.

use axum::{Router, extract::State, routing::get};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::DataResponse;
use crate::db::OrderRepository;
use crate::deadline::Deadline;
use crate::error::{AppError, Result};
use crate::extract::{Json, Query};
use crate::middleware::RequireRole;
use crate::models::{Order, SalesReport};
use crate::services::auth::Administrators;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/reports/sales", get(sales_report))
}

/// Inclusive calendar-day range, both ends optional.
#[derive(Debug, Default, Deserialize)]
pub struct SalesReportQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct SalesReportResponse {
    #[serde(flatten)]
    pub report: SalesReport,
    pub orders: Vec<Order>,
}

/// Order count, revenue (from `total_amount`) and count per status over
/// live orders created in the range.
pub async fn sales_report(
    State(state): State<AppState>,
    deadline: Deadline,
    RequireRole(..): RequireRole<Administrators>,
    Query(query): Query<SalesReportQuery>,
) -> Result<Json<DataResponse<SalesReportResponse>>> {
    if matches!((query.start_date, query.end_date), (Some(start), Some(end)) if start > end) {
        return Err(AppError::BadRequest(
            "start_date must not be after end_date".to_string(),
        ));
    }

    let start = query.start_date.map(|d| format!("{d}T00:00:00Z"));
    let end = query.end_date.map(|d| format!("{d}T23:59:59.999999Z"));

    let orders = deadline
        .run(OrderRepository::new(state.store()).created_between(start.as_deref(), end.as_deref()))
        .await??;

    Ok(Json(DataResponse::new(SalesReportResponse {
        report: SalesReport::from_orders(&orders),
        orders,
    })))
}

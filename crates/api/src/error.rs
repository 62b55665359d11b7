//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. The response is always a JSON
//! object with an `error` field; server-side failures are captured to Sentry
//! before responding and their details are never sent to the client.

use std::time::Duration;

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::deadline::DeadlineExceeded;
use crate::services::auth::AuthError;
use crate::services::orders::OrderError;
use crate::services::rate_limiter::retry_after_secs;
use crate::store::StoreError;

/// Application-level error type for the gateway.
#[derive(Debug, Error)]
pub enum AppError {
    /// The client exhausted its request budget for the current window.
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited { retry_after: Duration },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Order(#[from] OrderError),

    /// Data Store operation failed outside the order workflow.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Request timed out")]
    Deadline(#[from] DeadlineExceeded),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("{0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Auth(err) => match err {
                AuthError::MissingCredential
                | AuthError::MalformedCredential
                | AuthError::InvalidOrExpired => StatusCode::UNAUTHORIZED,
                AuthError::ProfileNotFound => StatusCode::NOT_FOUND,
                AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
                AuthError::Store(err) => repository_status(err),
                AuthError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            },
            Self::Order(err) => match err {
                OrderError::InvalidRequest(_) | OrderError::InsufficientStock { .. } => {
                    StatusCode::BAD_REQUEST
                }
                OrderError::CustomerNotFound(_) | OrderError::ProductNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                OrderError::PartialWriteFailure { .. } | OrderError::StoreUnavailable(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                OrderError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            },
            Self::Repository(err) => repository_status(err),
            Self::Deadline(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Server-side details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Auth(AuthError::Store(err)) | Self::Repository(err) => {
                repository_message(err).to_string()
            }
            Self::Auth(AuthError::Timeout) | Self::Deadline(_) => "Request timed out".to_string(),
            Self::Order(OrderError::PartialWriteFailure { .. }) => {
                "Order could not be completed".to_string()
            }
            Self::Order(OrderError::StoreUnavailable(_)) => "Data store unavailable".to_string(),
            Self::Order(OrderError::DeadlineExceeded) => "Request timed out".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Fields added next to `error` for errors that carry caller-relevant state.
    fn details(&self) -> Map<String, Value> {
        let mut extra = Map::new();
        match self {
            Self::Auth(AuthError::Forbidden { role, required }) => {
                extra.insert("user_role".into(), json!(role));
                extra.insert("required_roles".into(), json!(required));
            }
            Self::Order(OrderError::PartialWriteFailure {
                order_id,
                line_index,
                compensated,
                ..
            }) => {
                extra.insert("order_id".into(), json!(order_id));
                extra.insert("failed_line".into(), json!(line_index));
                extra.insert("compensated".into(), json!(compensated));
            }
            Self::Order(OrderError::InsufficientStock {
                product_id,
                requested,
                available,
            }) => {
                extra.insert("product_id".into(), json!(product_id));
                extra.insert("requested".into(), json!(requested));
                extra.insert("available".into(), json!(available));
            }
            Self::Order(OrderError::ProductNotFound(product_id)) => {
                extra.insert("product_id".into(), json!(product_id));
            }
            _ => {}
        }
        extra
    }
}

fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
        RepositoryError::Store(StoreError::Rejected { .. }) => StatusCode::BAD_GATEWAY,
        RepositoryError::Store(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

const fn repository_message(err: &RepositoryError) -> &'static str {
    match err {
        RepositoryError::Store(StoreError::Conflict(_)) => "A record with this code already exists",
        RepositoryError::Store(StoreError::Rejected { .. }) => "Data store rejected the request",
        RepositoryError::Store(_) => "Data store unavailable",
        RepositoryError::DataCorruption(_) => "Internal server error",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                status = status.as_u16(),
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let mut body = self.details();
        body.insert("error".into(), Value::String(self.public_message()));

        let mut response = (status, Json(Value::Object(body))).into_response();

        if let Self::RateLimited { retry_after } = self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_secs(retry_after)),
            );
        }

        response
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Attach the authenticated subject to the Sentry scope.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(subject: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(subject.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use appejv_core::{OrderId, ProductId, Role};

    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_status_codes() {
        let cases = [
            (AppError::Auth(AuthError::MissingCredential), StatusCode::UNAUTHORIZED),
            (AppError::Auth(AuthError::MalformedCredential), StatusCode::UNAUTHORIZED),
            (AppError::Auth(AuthError::InvalidOrExpired), StatusCode::UNAUTHORIZED),
            (AppError::Auth(AuthError::ProfileNotFound), StatusCode::NOT_FOUND),
            (
                AppError::Order(OrderError::ProductNotFound(ProductId::new(1))),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::Order(OrderError::InsufficientStock {
                    product_id: ProductId::new(1),
                    requested: 2,
                    available: 0,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Repository(RepositoryError::Store(StoreError::Conflict("dup".into()))),
                StatusCode::CONFLICT,
            ),
            (
                AppError::Repository(RepositoryError::Store(StoreError::Rejected {
                    status: 400,
                    message: "bad column".into(),
                })),
                StatusCode::BAD_GATEWAY,
            ),
            (AppError::Deadline(DeadlineExceeded), StatusCode::GATEWAY_TIMEOUT),
            (AppError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_forbidden_reports_roles() {
        let err = AppError::Auth(AuthError::Forbidden {
            role: Role::Customer,
            required: Role::ADMINISTRATORS.to_vec(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Insufficient permissions");
        assert_eq!(body["user_role"], "customer");
        assert_eq!(body["required_roles"], json!(["admin", "sale_admin"]));
    }

    #[tokio::test]
    async fn test_partial_failure_reports_order_without_reason() {
        let err = AppError::Order(OrderError::PartialWriteFailure {
            order_id: OrderId::new(7),
            line_index: 1,
            compensated: true,
            reason: "order item insert failed: connection reset".into(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["order_id"], 7);
        assert_eq!(body["failed_line"], 1);
        assert_eq!(body["compensated"], true);
        assert!(!body.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let response = AppError::RateLimited {
            retry_after: Duration::from_millis(12_300),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "13");
    }

    #[tokio::test]
    async fn test_store_details_are_hidden() {
        let err = AppError::Repository(RepositoryError::Store(StoreError::Unavailable(
            "connect to 10.0.0.3:5432 refused".into(),
        )));
        let body = body_json(err.into_response()).await;
        assert_eq!(body, json!({"error": "Data store unavailable"}));
    }
}

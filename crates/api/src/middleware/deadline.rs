//! Stamps every request with its [`Deadline`].

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::deadline::Deadline;
use crate::state::AppState;

/// Insert `now + request_timeout` into the request extensions.
pub async fn deadline_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let deadline = Deadline::after(state.settings().request_timeout);
    request.extensions_mut().insert(deadline);
    next.run(request).await
}

//! The caller's own profile.

use axum::{Router, routing::get};

use super::DataResponse;
use crate::extract::Json;
use crate::middleware::CurrentUser;
use crate::models::CurrentProfile;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile))
}

/// Any authenticated caller with a profile, whatever the role.
pub async fn get_profile(CurrentUser(user): CurrentUser) -> Json<DataResponse<CurrentProfile>> {
    Json(DataResponse::new(CurrentProfile {
        profile: user.profile,
        email: user.identity.email,
    }))
}

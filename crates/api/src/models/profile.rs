//! Application profile attached to a verified identity.

use serde::Serialize;

use appejv_core::{Email, Role, SubjectId};

/// Profile row keyed by the identity's subject id.
///
/// Read-only from the gateway's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: SubjectId,
    pub full_name: Option<String>,
    pub role: Role,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
}

/// What `GET /profile` returns: the profile plus the verified email.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentProfile {
    #[serde(flatten)]
    pub profile: Profile,
    pub email: Email,
}

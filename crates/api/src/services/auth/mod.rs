//! Authentication and authorization pipeline.
//!
//! Two independent gates run in order for every protected request:
//!
//! 1. [`verifier`] turns the `Authorization` header into a verified
//!    [`Identity`] by asking the Identity Provider.
//! 2. [`profile`] loads the application [`Profile`](crate::models::Profile)
//!    for that identity. A valid identity without a profile fails closed.
//!
//! The result is an [`AuthContext`] that handlers and the role
//! [`guard`] read; the guard itself never performs a lookup.

pub mod error;
pub mod guard;
pub mod profile;
pub mod provider;
pub mod verifier;

use appejv_core::{Email, SubjectId};

use crate::models::Profile;

pub use error::AuthError;
pub use guard::{Administrators, RolePolicy, SalesStaff, require_role};
pub use profile::resolve_profile;
pub use provider::{HttpIdentityProvider, IdentityClaims, IdentityProvider, ProviderError};
pub use verifier::{bearer_token, verify};

/// A subject verified by the Identity Provider. Lives for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: SubjectId,
    pub email: Email,
}

/// Everything the pipeline learned about the caller.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: Identity,
    pub profile: Profile,
}

//! Authentication and authorization errors.

use thiserror::Error;

use appejv_core::Role;

use crate::db::RepositoryError;

/// Why a request was not allowed through the auth pipeline.
///
/// Verification failures are deliberately collapsed into
/// [`AuthError::InvalidOrExpired`]; the caller never learns whether a token
/// was expired, revoked or never valid.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization` header.
    #[error("Authorization header required")]
    MissingCredential,

    /// Header present but not `Bearer <token>`.
    #[error("Invalid authorization header format. Use: Bearer <token>")]
    MalformedCredential,

    /// The Identity Provider did not vouch for the token.
    #[error("Invalid or expired token")]
    InvalidOrExpired,

    /// Verified identity with no application profile.
    #[error("User profile not found")]
    ProfileNotFound,

    /// Authenticated, but the role is not in the required set.
    #[error("Insufficient permissions")]
    Forbidden { role: Role, required: Vec<Role> },

    /// Profile lookup failed.
    #[error("profile lookup failed: {0}")]
    Store(#[from] RepositoryError),

    /// The request deadline passed during profile lookup.
    #[error("profile lookup timed out")]
    Timeout,
}

//! Authentication extractors.
//!
//! [`CurrentUser`] runs the identity verifier and profile resolver;
//! [`RequireRole`] adds the role guard on top. The resolved
//! [`AuthContext`] is cached in the request extensions so a handler that
//! takes several auth extractors verifies the caller once.

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::Span;

use crate::deadline::Deadline;
use crate::error::{AppError, set_sentry_user};
use crate::services::auth::{AuthContext, AuthError, RolePolicy, require_role, resolve_profile, verify};
use crate::state::AppState;

/// Extractor that requires a verified caller with a profile.
///
/// # Example
///
/// ```rust,ignore
/// async fn whoami(CurrentUser(user): CurrentUser) -> String {
///     format!("{} ({})", user.identity.email, user.profile.role)
/// }
/// ```
pub struct CurrentUser(pub AuthContext);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(context) = parts.extensions.get::<AuthContext>() {
            return Ok(Self(context.clone()));
        }

        let deadline = parts
            .extensions
            .get::<Deadline>()
            .copied()
            .unwrap_or_else(|| Deadline::after(state.settings().request_timeout));

        let header = match parts.headers.get(AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| AuthError::MalformedCredential)?),
            None => None,
        };

        let identity = verify(state.identity(), header, deadline).await?;
        let profile = resolve_profile(state.store(), &identity.subject, deadline).await?;

        Span::current().record("subject", identity.subject.as_str());
        set_sentry_user(&identity.subject, Some(identity.email.as_str()));

        let context = AuthContext { identity, profile };
        parts.extensions.insert(context.clone());
        Ok(Self(context))
    }
}

/// Extractor that requires a caller whose role is in `P::ROLES`.
///
/// ```rust,ignore
/// async fn delete_product(RequireRole(user, ..): RequireRole<Administrators>) { ... }
/// ```
pub struct RequireRole<P: RolePolicy>(pub AuthContext, pub PhantomData<P>);

impl<P: RolePolicy> FromRequestParts<AppState> for RequireRole<P> {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(context) = CurrentUser::from_request_parts(parts, state).await?;
        require_role(&context.profile, P::ROLES)?;
        Ok(Self(context, PhantomData))
    }
}

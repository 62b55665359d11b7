//! Bearer credential verification.

use tracing::{debug, instrument, warn};

use appejv_core::{Email, SubjectId};

use super::provider::{IdentityProvider, ProviderError};
use super::{AuthError, Identity};
use crate::deadline::Deadline;

/// Extract the token from an `Authorization` header value.
///
/// The header must be exactly `Bearer <token>`: two parts separated by a
/// single space, scheme spelled `Bearer`. No external call is made here.
///
/// # Errors
///
/// `MissingCredential` for an absent or empty header, `MalformedCredential`
/// for anything else that is not `Bearer <token>`.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header
        .filter(|h| !h.is_empty())
        .ok_or(AuthError::MissingCredential)?;

    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedCredential),
    }
}

/// Verify the caller's `Authorization` header with the Identity Provider.
///
/// Exactly one provider call is made for a well-formed header, bounded by
/// `deadline`. Every provider-side failure, a timeout included, becomes
/// `InvalidOrExpired`.
///
/// # Errors
///
/// See [`bearer_token`] for header errors; otherwise `InvalidOrExpired`.
#[instrument(skip_all)]
pub async fn verify(
    provider: &dyn IdentityProvider,
    header: Option<&str>,
    deadline: Deadline,
) -> Result<Identity, AuthError> {
    let token = bearer_token(header)?;

    let claims = match deadline.run(provider.lookup(token)).await {
        Ok(Ok(claims)) => claims,
        Ok(Err(ProviderError::Unreachable(reason))) => {
            warn!(%reason, "Identity provider unreachable");
            return Err(AuthError::InvalidOrExpired);
        }
        Ok(Err(err)) => {
            debug!(error = %err, "Token rejected");
            return Err(AuthError::InvalidOrExpired);
        }
        Err(_) => {
            warn!("Identity provider lookup hit the request deadline");
            return Err(AuthError::InvalidOrExpired);
        }
    };

    let subject = SubjectId::new(claims.id);
    if subject.is_blank() {
        debug!("Identity provider returned a blank subject");
        return Err(AuthError::InvalidOrExpired);
    }
    let email = Email::parse(&claims.email).map_err(|e| {
        debug!(error = %e, "Identity provider returned an unusable email");
        AuthError::InvalidOrExpired
    })?;

    Ok(Identity { subject, email })
}

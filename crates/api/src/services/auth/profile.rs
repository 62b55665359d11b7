//! Profile resolution for a verified subject.

use tracing::{debug, instrument};

use appejv_core::SubjectId;

use super::AuthError;
use crate::db::ProfileRepository;
use crate::deadline::Deadline;
use crate::models::Profile;
use crate::store::DataStore;

/// Load the profile for `subject` with a single one-row read.
///
/// # Errors
///
/// `ProfileNotFound` when no row exists (a valid identity without a profile
/// fails closed), `Store` when the read fails, `Timeout` when the deadline
/// passes first.
#[instrument(skip(store, deadline), fields(subject = %subject))]
pub async fn resolve_profile(
    store: &dyn DataStore,
    subject: &SubjectId,
    deadline: Deadline,
) -> Result<Profile, AuthError> {
    let profile = deadline
        .run(ProfileRepository::new(store).get(subject))
        .await
        .map_err(|_| AuthError::Timeout)??;

    profile.ok_or_else(|| {
        debug!("Verified subject has no profile");
        AuthError::ProfileNotFound
    })
}

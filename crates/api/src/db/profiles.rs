//! Profile lookups.

use serde::Deserialize;

use appejv_core::{Role, SubjectId};

use super::{RepositoryError, decode_rows};
use crate::models::Profile;
use crate::store::{Collection, DataStore, Query};

#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: String,
    full_name: Option<String>,
    role: Option<String>,
    phone: Option<String>,
    avatar_url: Option<String>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = RepositoryError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let id = SubjectId::new(row.id);
        if id.is_blank() {
            return Err(RepositoryError::DataCorruption(
                "profile with blank id".to_string(),
            ));
        }
        Ok(Self {
            id,
            full_name: row.full_name,
            // A missing role is kept as an unknown one so it never matches a role set
            role: row.role.as_deref().map_or_else(|| Role::Unknown(String::new()), Role::from),
            phone: row.phone,
            avatar_url: row.avatar_url,
        })
    }
}

/// Repository for profiles.
pub struct ProfileRepository<'a> {
    store: &'a dyn DataStore,
}

impl<'a> ProfileRepository<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn DataStore) -> Self {
        Self { store }
    }

    /// Fetch the profile for `subject`, reading at most one row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the read fails.
    /// Returns `RepositoryError::DataCorruption` if the row is invalid.
    pub async fn get(&self, subject: &SubjectId) -> Result<Option<Profile>, RepositoryError> {
        let query = Query::new(Collection::Profiles)
            .eq("id", subject.as_str())
            .range(0, 1);
        let selection = self.store.select(&query).await?;
        Ok(decode_rows::<ProfileRow, Profile>(selection.rows)?
            .into_iter()
            .next())
    }
}

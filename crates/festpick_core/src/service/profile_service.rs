//! Profile management use-case service.
//!
//! # Responsibility
//! - Provide list/rename/recolor/delete for the profile picker.
//! - Keep metadata rows, per-profile files and the active source consistent
//!   on deletion.
//!
//! # Invariants
//! - `"Default"` can never be deleted.
//! - Deleting the active profile switches the active source back to Default.

use crate::db::{self, DbError, SharedConnection};
use crate::files::{DataFileError, ProfileDataFiles};
use crate::model::profile::{is_default_identity, ProfileId, ProfileMetadata};
use crate::repo::profile_repo::{ProfileRepoError, ProfileRepository, SqliteProfileRepository};
use crate::source::{ActiveSourceController, SourceError};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Service error for profile management.
#[derive(Debug)]
pub enum ProfileServiceError {
    /// Attempt to delete the reserved Default profile.
    DefaultProfileUndeletable,
    /// Label is blank after trim.
    InvalidLabel,
    /// Color token is blank after trim.
    InvalidColor,
    ProfileNotFound(ProfileId),
    Db(DbError),
    Repo(ProfileRepoError),
    Files(DataFileError),
    Source(SourceError),
}

impl Display for ProfileServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DefaultProfileUndeletable => write!(f, "the Default profile cannot be deleted"),
            Self::InvalidLabel => write!(f, "profile label must not be blank"),
            Self::InvalidColor => write!(f, "profile color must not be blank"),
            Self::ProfileNotFound(identity) => write!(f, "profile not found: {identity}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Files(err) => write!(f, "{err}"),
            Self::Source(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProfileServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Files(err) => Some(err),
            Self::Source(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ProfileServiceError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<ProfileRepoError> for ProfileServiceError {
    fn from(value: ProfileRepoError) -> Self {
        match value {
            ProfileRepoError::NotFound(identity) => Self::ProfileNotFound(identity),
            other => Self::Repo(other),
        }
    }
}

impl From<DataFileError> for ProfileServiceError {
    fn from(value: DataFileError) -> Self {
        Self::Files(value)
    }
}

impl From<SourceError> for ProfileServiceError {
    fn from(value: SourceError) -> Self {
        Self::Source(value)
    }
}

pub type ProfileServiceResult<T> = Result<T, ProfileServiceError>;

/// Picker row: stored metadata plus live state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSummary {
    pub metadata: ProfileMetadata,
    /// Whether this profile is the active source.
    pub is_active: bool,
    /// Whether per-profile data files exist (always false for Default).
    pub has_data_files: bool,
}

/// Profile picker operations over the Local Store.
pub struct ProfileService {
    conn: SharedConnection,
    files: Arc<ProfileDataFiles>,
    controller: Arc<ActiveSourceController>,
}

impl ProfileService {
    pub fn new(
        conn: SharedConnection,
        files: Arc<ProfileDataFiles>,
        controller: Arc<ActiveSourceController>,
    ) -> Self {
        Self {
            conn,
            files,
            controller,
        }
    }

    /// Lists every profile, Default first.
    pub fn list_profiles(&self) -> ProfileServiceResult<Vec<ProfileMetadata>> {
        self.with_repo(|repo| repo.list_profiles())
    }

    /// Gets one profile's metadata.
    pub fn profile(&self, identity: &str) -> ProfileServiceResult<ProfileMetadata> {
        self.with_repo(|repo| repo.get_profile(identity))?
            .ok_or_else(|| ProfileServiceError::ProfileNotFound(identity.to_string()))
    }

    /// Metadata, counts and active state for one profile.
    pub fn profile_summary(&self, identity: &str) -> ProfileServiceResult<ProfileSummary> {
        let metadata = self.profile(identity)?;
        let has_data_files = !metadata.is_default() && self.files.has_namespace(identity);
        Ok(ProfileSummary {
            is_active: self.controller.active_source() == metadata.identity,
            has_data_files,
            metadata,
        })
    }

    /// Renames one profile and returns the updated row.
    pub fn rename_profile(
        &self,
        identity: &str,
        label: &str,
    ) -> ProfileServiceResult<ProfileMetadata> {
        if label.trim().is_empty() {
            return Err(ProfileServiceError::InvalidLabel);
        }
        self.with_repo(|repo| repo.update_label(identity, label))?;
        info!(
            "event=profile_rename module=service status=ok identity={}",
            identity
        );
        self.profile(identity)
    }

    /// Recolors one profile and returns the updated row.
    pub fn recolor_profile(
        &self,
        identity: &str,
        color: &str,
    ) -> ProfileServiceResult<ProfileMetadata> {
        if color.trim().is_empty() {
            return Err(ProfileServiceError::InvalidColor);
        }
        self.with_repo(|repo| repo.update_color(identity, color))?;
        info!(
            "event=profile_recolor module=service status=ok identity={}",
            identity
        );
        self.profile(identity)
    }

    /// Deletes an imported profile, its files and its active-source status.
    ///
    /// Files go first so a failure leaves the row (and the picker entry)
    /// in place.
    pub fn delete_profile(&self, identity: &str) -> ProfileServiceResult<()> {
        if is_default_identity(identity) {
            return Err(ProfileServiceError::DefaultProfileUndeletable);
        }
        if self.with_repo(|repo| repo.get_profile(identity))?.is_none() {
            return Err(ProfileServiceError::ProfileNotFound(identity.to_string()));
        }

        if let Err(err) = self.files.delete_all(identity) {
            error!(
                "event=profile_delete module=service status=error stage=files identity={} error={}",
                identity, err
            );
            return Err(err.into());
        }
        if !self.with_repo(|repo| repo.delete_profile(identity))? {
            return Err(ProfileServiceError::ProfileNotFound(identity.to_string()));
        }
        self.controller.forget_source(identity)?;

        info!(
            "event=profile_delete module=service status=ok identity={}",
            identity
        );
        Ok(())
    }

    fn with_repo<T>(
        &self,
        f: impl FnOnce(&SqliteProfileRepository<'_>) -> Result<T, ProfileRepoError>,
    ) -> ProfileServiceResult<T> {
        let guard = db::lock(&self.conn)?;
        let repo = SqliteProfileRepository::try_new(&guard)?;
        Ok(f(&repo)?)
    }
}

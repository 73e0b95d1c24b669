//! Two-phase import: decide new vs. update, then commit.

use crate::db::{self, DbError, SharedConnection};
use crate::files::{DataFileError, NamespaceSnapshot, ProfileDataFiles};
use crate::model::profile::{now_epoch_ms, ProfileId, ProfileMetadata};
use crate::repo::app_state_repo::AppStateRepository;
use crate::repo::profile_repo::{ProfileRepoError, ProfileRepository, SqliteProfileRepository};
use crate::share::color::ColorAllocator;
use crate::share::envelope::{validate_and_parse, DecodeError, ShareEnvelope, ShareVariant};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;

/// Label offered when the sender did not name their share.
pub const FALLBACK_PROFILE_LABEL: &str = "Shared Profile";

pub type ImportResult<T> = Result<T, ImportError>;

/// Import failures. Decode failures never touch stored state.
#[derive(Debug)]
pub enum ImportError {
    Decode(DecodeError),
    Db(DbError),
    Repo(ProfileRepoError),
    Files(DataFileError),
    /// The envelope was exported by this very install.
    SelfImport,
    /// Update was confirmed but the profile no longer exists.
    UpdateTargetMissing(ProfileId),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Files(err) => write!(f, "{err}"),
            Self::SelfImport => write!(f, "share file was exported by this device"),
            Self::UpdateTargetMissing(identity) => {
                write!(f, "profile to update no longer exists: {identity}")
            }
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Files(err) => Some(err),
            Self::SelfImport => None,
            Self::UpdateTargetMissing(_) => None,
        }
    }
}

impl From<DecodeError> for ImportError {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<DbError> for ImportError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<ProfileRepoError> for ImportError {
    fn from(value: ProfileRepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<DataFileError> for ImportError {
    fn from(value: DataFileError) -> Self {
        Self::Files(value)
    }
}

/// Which confirmation the caller must show before committing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDecision {
    /// A profile with this identity exists. Its label is shown read-only.
    Update {
        identity: ProfileId,
        existing_label: String,
        existing_color: String,
        /// Counts `commit` will store for the incoming envelope.
        priority_count: usize,
        attendance_count: usize,
    },
    /// First import from this sender. The label is editable.
    New {
        identity: ProfileId,
        suggested_label: String,
        priority_count: usize,
        attendance_count: usize,
    },
}

impl ImportDecision {
    pub fn identity(&self) -> &str {
        match self {
            Self::Update { identity, .. } | Self::New { identity, .. } => identity.as_str(),
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Self::Update { .. })
    }
}

/// Result of a committed import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub metadata: ProfileMetadata,
    pub was_update: bool,
    /// Attendance keys dropped as malformed.
    pub rejected_attendance_keys: Vec<String>,
}

/// Drives validate → decide → commit for incoming share files.
pub struct ShareImporter {
    conn: SharedConnection,
    files: Arc<ProfileDataFiles>,
    colors: Arc<dyn ColorAllocator>,
    variant: ShareVariant,
}

impl ShareImporter {
    pub fn new(
        conn: SharedConnection,
        files: Arc<ProfileDataFiles>,
        colors: Arc<dyn ColorAllocator>,
        variant: ShareVariant,
    ) -> Self {
        Self {
            conn,
            files,
            colors,
            variant,
        }
    }

    /// Decodes a share file. Any failure means "invalid file".
    pub fn validate_and_parse(&self, path: impl AsRef<Path>) -> ImportResult<ShareEnvelope> {
        match validate_and_parse(path, self.variant) {
            Ok(envelope) => {
                info!(
                    "event=share_parse module=share status=ok priorities={} attendance={}",
                    envelope.priorities.len(),
                    envelope.attendance.len()
                );
                Ok(envelope)
            }
            Err(err) => {
                warn!(
                    "event=share_parse module=share status=error error={}",
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Chooses between the update and new-profile confirmations.
    pub fn decide(&self, envelope: &ShareEnvelope) -> ImportResult<ImportDecision> {
        let guard = db::lock(&self.conn)?;
        self.reject_self_import(&guard, envelope)?;
        let repo = SqliteProfileRepository::try_new(&guard)?;
        let identity = envelope.sender_user_id.clone();
        let priority_count = envelope.decode_priorities().len();
        let attendance_count = envelope.decode_attendance().entries.len();

        Ok(match repo.get_profile(&identity)? {
            Some(existing) => ImportDecision::Update {
                identity,
                existing_label: existing.label,
                existing_color: existing.color,
                priority_count,
                attendance_count,
            },
            None => ImportDecision::New {
                identity,
                suggested_label: suggested_label(envelope),
                priority_count,
                attendance_count,
            },
        })
    }

    /// Writes the envelope's records and upserts the profile row.
    ///
    /// Updates keep the stored label and color; new profiles take the
    /// chosen label and an allocated color. Re-running overwrites.
    ///
    /// On any failure the profile's files and row are left as they were
    /// before the call.
    pub fn commit(
        &self,
        envelope: &ShareEnvelope,
        chosen_label: &str,
        is_update: bool,
    ) -> ImportResult<ImportOutcome> {
        let identity = envelope.sender_user_id.as_str();
        let existing = {
            let guard = db::lock(&self.conn)?;
            self.reject_self_import(&guard, envelope)?;
            let repo = SqliteProfileRepository::try_new(&guard)?;
            repo.get_profile(identity)?
        };

        if is_update && existing.is_none() {
            return Err(ImportError::UpdateTargetMissing(identity.to_string()));
        }
        let created = existing.is_none();

        let label = match (&existing, is_update) {
            (Some(row), true) => row.label.clone(),
            _ => {
                let trimmed = chosen_label.trim();
                if trimmed.is_empty() {
                    suggested_label(envelope)
                } else {
                    trimmed.to_string()
                }
            }
        };
        let color = match &existing {
            Some(row) => row.color.clone(),
            None => self.colors.color_for(identity),
        };

        let priorities = envelope.decode_priorities();
        let attendance = envelope.decode_attendance();

        let snapshot = match self.files.snapshot(identity) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(
                    "event=share_import module=share status=error stage=snapshot identity={} error={}",
                    identity, err
                );
                return Err(err.into());
            }
        };
        if let Err(err) = self
            .files
            .replace_all(identity, &priorities, &attendance.entries)
        {
            error!(
                "event=share_import module=share status=error stage=files identity={} error={}",
                identity, err
            );
            self.roll_back(&snapshot, created);
            return Err(err.into());
        }

        let metadata = ProfileMetadata {
            identity: identity.to_string(),
            label,
            color,
            import_date: now_epoch_ms(),
            share_date: envelope.share_date,
            event_year: envelope.event_year,
            priority_count: count(priorities.len()),
            attendance_count: count(attendance.entries.len()),
            is_read_only: false,
        };

        let upserted = db::lock(&self.conn)
            .map_err(ImportError::from)
            .and_then(|guard| {
                SqliteProfileRepository::try_new(&guard)?.upsert_profile(&metadata)?;
                Ok(())
            });
        if let Err(err) = upserted {
            error!(
                "event=share_import module=share status=error stage=metadata identity={} error={}",
                identity, err
            );
            self.roll_back(&snapshot, created);
            return Err(err);
        }

        let stored = {
            let guard = db::lock(&self.conn)?;
            let repo = SqliteProfileRepository::try_new(&guard)?;
            repo.get_profile(identity)?.unwrap_or(metadata)
        };
        info!(
            "event=share_import module=share status=ok mode={} identity={} priorities={} attendance={} rejected_keys={}",
            if created { "new" } else { "update" },
            identity,
            stored.priority_count,
            stored.attendance_count,
            attendance.rejected_keys.len()
        );
        Ok(ImportOutcome {
            metadata: stored,
            was_update: !created,
            rejected_attendance_keys: attendance.rejected_keys,
        })
    }

    fn reject_self_import(
        &self,
        conn: &rusqlite::Connection,
        envelope: &ShareEnvelope,
    ) -> ImportResult<()> {
        let own_identity = AppStateRepository::new(conn).install_identity()?;
        if own_identity == envelope.sender_user_id {
            return Err(ImportError::SelfImport);
        }
        Ok(())
    }

    /// Puts the namespace back as `snapshot` saw it. A namespace created by
    /// this import is removed entirely.
    fn roll_back(&self, snapshot: &NamespaceSnapshot, created: bool) {
        let rolled_back = if created && snapshot.is_empty() {
            self.files.delete_all(snapshot.identity())
        } else {
            self.files.restore(snapshot)
        };
        if let Err(err) = rolled_back {
            warn!(
                "event=share_import module=share status=error stage=rollback identity={} error={}",
                snapshot.identity(),
                err
            );
        }
    }
}

/// Label offered for a new profile: the sender's name or a fallback.
pub fn suggested_label(envelope: &ShareEnvelope) -> String {
    envelope
        .sender_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_PROFILE_LABEL)
        .to_string()
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

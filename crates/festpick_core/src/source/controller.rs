//! Active-source controller.

use crate::db::{self, DbError, SharedConnection};
use crate::files::{DataFileError, ProfileDataFiles};
use crate::model::profile::{is_default_identity, DEFAULT_PROFILE_ID};
use crate::model::ranking::{AttendanceStatus, PriorityRank};
use crate::repo::app_state_repo::AppStateRepository;
use crate::repo::profile_repo::{ProfileRepoError, ProfileRepository, SqliteProfileRepository};
use crate::source::clock::Clock;
use crate::source::default_records::DefaultRecords;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Quiet window opened by every switch.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(5);

pub type SourceResult<T> = Result<T, SourceError>;

/// Errors from source selection and routed edits.
#[derive(Debug)]
pub enum SourceError {
    Db(DbError),
    Repo(ProfileRepoError),
    Files(DataFileError),
    /// Identity has no stored metadata.
    UnknownSource(String),
    /// Edits were routed to a read-only profile.
    ReadOnlySource(String),
    /// Application-wide Default storage refused the edit.
    DefaultRecords(String),
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Files(err) => write!(f, "{err}"),
            Self::UnknownSource(identity) => write!(f, "unknown profile source: {identity}"),
            Self::ReadOnlySource(identity) => write!(f, "profile source is read-only: {identity}"),
            Self::DefaultRecords(message) => write!(f, "default records write failed: {message}"),
        }
    }
}

impl Error for SourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Files(err) => Some(err),
            Self::UnknownSource(_) => None,
            Self::ReadOnlySource(_) => None,
            Self::DefaultRecords(_) => None,
        }
    }
}

impl From<DbError> for SourceError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<ProfileRepoError> for SourceError {
    fn from(value: ProfileRepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<DataFileError> for SourceError {
    fn from(value: DataFileError) -> Self {
        Self::Files(value)
    }
}

/// Receives switch notifications. Called synchronously after the switch
/// is persisted.
pub trait SourceListener: Send + Sync {
    fn on_source_changed(&self, identity: &str);
    /// Asks views to re-read through the controller.
    fn on_refresh(&self);
}

/// Proof that a background writer checked in before writing.
///
/// Carries the switch generation so a writer can detect that a switch
/// happened while it was busy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePermit {
    pub source: String,
    pub generation: u64,
}

/// Why a background writer must skip its current pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteDenied {
    /// Inside the quiet window after a switch.
    Suppressed { remaining: Duration },
    /// The writer believes a different source is active.
    StaleSource { active: String },
}

impl Display for WriteDenied {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Suppressed { remaining } => write!(
                f,
                "writes suppressed for another {} ms after source switch",
                remaining.as_millis()
            ),
            Self::StaleSource { active } => write!(f, "stale source; active source is {active}"),
        }
    }
}

impl Error for WriteDenied {}

/// Owns the active-source context and routes reads/edits through it.
///
/// Shared as `Arc<ActiveSourceController>` between UI flows and background
/// workers. `set_active_source` is expected to be called from one
/// serialized context.
pub struct ActiveSourceController {
    conn: SharedConnection,
    files: Arc<ProfileDataFiles>,
    default_records: Arc<dyn DefaultRecords>,
    clock: Arc<dyn Clock>,
    quiet_period: Duration,
    active: RwLock<String>,
    suppress_until: Mutex<Option<Instant>>,
    generation: AtomicU64,
    listeners: RwLock<Vec<Arc<dyn SourceListener>>>,
}

impl ActiveSourceController {
    /// Restores the persisted active source.
    ///
    /// A persisted identity whose metadata has gone away falls back to
    /// `"Default"`.
    pub fn new(
        conn: SharedConnection,
        files: Arc<ProfileDataFiles>,
        default_records: Arc<dyn DefaultRecords>,
        clock: Arc<dyn Clock>,
        quiet_period: Duration,
    ) -> SourceResult<Self> {
        let restored = {
            let guard = db::lock(&conn)?;
            let state = AppStateRepository::new(&guard);
            match state.active_source()? {
                Some(identity) if is_default_identity(&identity) => identity,
                Some(identity) => {
                    let repo = SqliteProfileRepository::try_new(&guard)?;
                    if repo.get_profile(&identity)?.is_some() {
                        identity
                    } else {
                        warn!(
                            "event=source_restore module=source status=fallback reason=missing_profile identity={}",
                            identity
                        );
                        state.set_active_source(DEFAULT_PROFILE_ID)?;
                        DEFAULT_PROFILE_ID.to_string()
                    }
                }
                None => DEFAULT_PROFILE_ID.to_string(),
            }
        };

        info!(
            "event=source_restore module=source status=ok identity={}",
            restored
        );
        Ok(Self {
            conn,
            files,
            default_records,
            clock,
            quiet_period,
            active: RwLock::new(restored),
            suppress_until: Mutex::new(None),
            generation: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
        })
    }

    /// Registers a listener for switch notifications.
    pub fn add_listener(&self, listener: Arc<dyn SourceListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Returns the active identity (`"Default"` unless switched).
    pub fn active_source(&self) -> String {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switches the active source and opens the quiet window.
    pub fn set_active_source(&self, identity: &str) -> SourceResult<()> {
        {
            let guard = db::lock(&self.conn)?;
            if !is_default_identity(identity) {
                let repo = SqliteProfileRepository::try_new(&guard)?;
                if repo.get_profile(identity)?.is_none() {
                    return Err(SourceError::UnknownSource(identity.to_string()));
                }
            }
            AppStateRepository::new(&guard).set_active_source(identity)?;
        }

        let previous = {
            let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *active, identity.to_string())
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self
            .suppress_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(self.clock.now() + self.quiet_period);

        info!(
            "event=source_switch module=source status=ok from={} to={} generation={} quiet_ms={}",
            previous,
            identity,
            generation,
            self.quiet_period.as_millis()
        );

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in &listeners {
            listener.on_source_changed(identity);
        }
        for listener in &listeners {
            listener.on_refresh();
        }
        Ok(())
    }

    /// Returns whether background writers must currently skip their pass.
    pub fn is_write_suppressed(&self) -> bool {
        self.suppression_remaining().is_some()
    }

    /// Checks a background writer in.
    ///
    /// Advisory only: a denied writer should skip this pass and try again on
    /// its next scheduled pass.
    pub fn begin_remote_write(&self, believed_source: &str) -> Result<WritePermit, WriteDenied> {
        if let Some(remaining) = self.suppression_remaining() {
            return Err(WriteDenied::Suppressed { remaining });
        }
        let active = self.active_source();
        if active != believed_source {
            return Err(WriteDenied::StaleSource { active });
        }
        Ok(WritePermit {
            source: active,
            generation: self.generation.load(Ordering::SeqCst),
        })
    }

    /// Returns whether no switch happened since `permit` was issued.
    pub fn permit_is_current(&self, permit: &WritePermit) -> bool {
        permit.generation == self.generation.load(Ordering::SeqCst)
            && permit.source == self.active_source()
            && !self.is_write_suppressed()
    }

    /// Rank for `band` in the active source.
    pub fn priority(&self, band: &str) -> PriorityRank {
        let active = self.active_source();
        if is_default_identity(&active) {
            self.default_records.priority(band)
        } else {
            self.files.read_priority(&active, band)
        }
    }

    /// Status for `event_key` in the active source.
    pub fn attendance(&self, event_key: &str) -> AttendanceStatus {
        let active = self.active_source();
        if is_default_identity(&active) {
            self.default_records.attendance(event_key)
        } else {
            self.files.read_attendance(&active, event_key)
        }
    }

    /// Records a rank in the active source.
    ///
    /// `Unknown` clears the entry.
    pub fn set_priority(&self, band: &str, rank: PriorityRank) -> SourceResult<()> {
        let active = self.active_source();
        if is_default_identity(&active) {
            return self
                .default_records
                .set_priority(band, rank)
                .map_err(SourceError::DefaultRecords);
        }
        self.ensure_writable(&active)?;

        let mut priorities = self.files.read_all_priorities(&active);
        if rank == PriorityRank::Unknown {
            priorities.remove(band);
        } else {
            priorities.insert(band.to_string(), rank);
        }
        self.files.write_priorities(&active, &priorities)?;
        self.refresh_counts(&active)
    }

    /// Records an attendance status in the active source.
    ///
    /// `Unset` clears the entry.
    pub fn set_attendance(&self, event_key: &str, status: AttendanceStatus) -> SourceResult<()> {
        let active = self.active_source();
        if is_default_identity(&active) {
            return self
                .default_records
                .set_attendance(event_key, status)
                .map_err(SourceError::DefaultRecords);
        }
        self.ensure_writable(&active)?;

        let mut attendance = self.files.read_all_attendance(&active);
        if status == AttendanceStatus::Unset {
            attendance.remove(event_key);
        } else {
            attendance.insert(event_key.to_string(), status);
        }
        self.files.write_attendance(&active, &attendance)?;
        self.refresh_counts(&active)
    }

    /// Looks up the read-only flag, failing safe to `true`.
    pub fn is_read_only(&self, identity: &str) -> bool {
        let lookup = || -> SourceResult<Option<bool>> {
            let guard = db::lock(&self.conn)?;
            let repo = SqliteProfileRepository::try_new(&guard)?;
            Ok(repo.get_profile(identity)?.map(|row| row.is_read_only))
        };
        match lookup() {
            Ok(Some(read_only)) => read_only,
            Ok(None) => true,
            Err(err) => {
                warn!(
                    "event=source_read_only module=source status=error identity={} error={}",
                    identity, err
                );
                true
            }
        }
    }

    /// Identities that can be switched to, Default first.
    pub fn available_sources(&self) -> SourceResult<Vec<String>> {
        let guard = db::lock(&self.conn)?;
        let repo = SqliteProfileRepository::try_new(&guard)?;
        Ok(repo
            .list_profiles()?
            .into_iter()
            .map(|row| row.identity)
            .collect())
    }

    /// Falls back to Default when `identity` was the active source.
    pub fn forget_source(&self, identity: &str) -> SourceResult<()> {
        if self.active_source() == identity && !is_default_identity(identity) {
            self.set_active_source(DEFAULT_PROFILE_ID)?;
        }
        Ok(())
    }

    fn ensure_writable(&self, identity: &str) -> SourceResult<()> {
        if self.is_read_only(identity) {
            return Err(SourceError::ReadOnlySource(identity.to_string()));
        }
        Ok(())
    }

    fn refresh_counts(&self, identity: &str) -> SourceResult<()> {
        let priority_count = count(self.files.read_all_priorities(identity).len());
        let attendance_count = count(self.files.read_all_attendance(identity).len());
        let guard = db::lock(&self.conn)?;
        SqliteProfileRepository::try_new(&guard)?.update_counts(
            identity,
            priority_count,
            attendance_count,
        )?;
        Ok(())
    }

    fn suppression_remaining(&self) -> Option<Duration> {
        let deadline = (*self
            .suppress_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner))?;
        let now = self.clock.now();
        (now < deadline).then(|| deadline - now)
    }
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

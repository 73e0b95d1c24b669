//! Export of the Default profile into a share file.

use crate::db::{self, DbError, SharedConnection};
use crate::model::profile::now_epoch_ms;
use crate::model::ranking::PriorityRank;
use crate::repo::app_state_repo::AppStateRepository;
use crate::share::envelope::{ShareEnvelope, ShareVariant, SHARE_FORMAT_VERSION};
use crate::source::DefaultRecords;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const FALLBACK_FILE_STEM: &str = "share";

pub type ExportResult<T> = Result<T, ExportError>;

/// Export failures. Nothing is left behind on failure.
#[derive(Debug)]
pub enum ExportError {
    /// Share name is blank after trim.
    InvalidShareName,
    Db(DbError),
    Json(serde_json::Error),
    Io { path: PathBuf, source: io::Error },
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidShareName => write!(f, "share name must not be blank"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "cannot encode share document: {err}"),
            Self::Io { path, source } => {
                write!(f, "cannot write share file `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidShareName => None,
            Self::Db(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<DbError> for ExportError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Result of one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    /// Written share file.
    pub path: PathBuf,
    pub priority_count: usize,
    pub attendance_count: usize,
}

/// Builds and writes share files from the Default profile.
pub struct ShareExporter {
    conn: SharedConnection,
    default_records: Arc<dyn DefaultRecords>,
    variant: ShareVariant,
    export_dir: PathBuf,
    event_year: i32,
}

impl ShareExporter {
    pub fn new(
        conn: SharedConnection,
        default_records: Arc<dyn DefaultRecords>,
        variant: ShareVariant,
        export_dir: impl Into<PathBuf>,
        event_year: i32,
    ) -> Self {
        Self {
            conn,
            default_records,
            variant,
            export_dir: export_dir.into(),
            event_year,
        }
    }

    /// Builds the envelope for the Default profile's current records.
    ///
    /// `Unknown` ranks are left out since an absent band reads as `Unknown`.
    /// Stored `Unset` statuses are kept: an absent key reads as `SawNone`.
    pub fn build_envelope(&self, share_name: &str) -> ExportResult<ShareEnvelope> {
        let share_name = share_name.trim();
        if share_name.is_empty() {
            return Err(ExportError::InvalidShareName);
        }

        let sender_user_id = {
            let guard = db::lock(&self.conn)?;
            AppStateRepository::new(&guard).install_identity()?
        };

        let priorities = self
            .default_records
            .all_priorities()
            .into_iter()
            .filter(|(_, rank)| *rank != PriorityRank::Unknown)
            .map(|(band, rank)| (band, rank.to_code()))
            .collect();
        let attendance = self
            .default_records
            .all_attendance()
            .into_iter()
            .map(|(key, status)| (key, status.to_code()))
            .collect();

        Ok(ShareEnvelope {
            sender_user_id,
            sender_name: Some(share_name.to_string()),
            share_date: now_epoch_ms(),
            event_year: self.event_year,
            version: SHARE_FORMAT_VERSION.to_string(),
            priorities,
            attendance,
        })
    }

    /// Exports the Default profile under `share_name` and returns the file.
    pub fn export(&self, share_name: &str) -> ExportResult<ExportOutcome> {
        let envelope = self.build_envelope(share_name)?;
        let body = envelope.to_json_bytes().map_err(ExportError::Json)?;
        let path = self.export_dir.join(format!(
            "{}.{}",
            file_stem_for(share_name),
            self.variant.extension()
        ));

        if let Err(err) = write_share_file(&path, &body) {
            error!(
                "event=share_export module=share status=error error={}",
                err
            );
            return Err(err);
        }

        info!(
            "event=share_export module=share status=ok variant={} priorities={} attendance={}",
            self.variant,
            envelope.priorities.len(),
            envelope.attendance.len()
        );
        Ok(ExportOutcome {
            path,
            priority_count: envelope.priorities.len(),
            attendance_count: envelope.attendance.len(),
        })
    }
}

/// Reduces a display name to a portable file stem.
fn file_stem_for(share_name: &str) -> String {
    let stem: String = share_name
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => Some(c),
            ' ' => Some('_'),
            _ => None,
        })
        .collect();
    if stem.is_empty() {
        FALLBACK_FILE_STEM.to_string()
    } else {
        stem
    }
}

fn write_share_file(path: &Path, body: &[u8]) -> ExportResult<()> {
    let io_error = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".partial");
    let temp_path = PathBuf::from(temp_name);
    fs::write(&temp_path, body).map_err(io_error)?;
    fs::rename(&temp_path, path).map_err(|source| {
        let _ = fs::remove_file(&temp_path);
        io_error(source)
    })
}

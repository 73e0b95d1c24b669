//! Process-level wiring of the profile subsystem.
//!
//! # Responsibility
//! - Open the Local Store and per-profile files from one `CoreConfig`.
//! - Hand out the controller, services and share flows over shared state.
//!
//! # Invariants
//! - Exactly one `ActiveSourceController` exists per runtime; every reader
//!   and writer goes through it.

use crate::config::CoreConfig;
use crate::db::{self, DbError, SharedConnection};
use crate::files::ProfileDataFiles;
use crate::service::profile_service::ProfileService;
use crate::share::{
    ColorAllocator, ImportError, ImportOutcome, PaletteColorAllocator, ShareExporter,
    ShareImporter,
};
use crate::source::{ActiveSourceController, Clock, DefaultRecords, SourceError, SystemClock};
use log::{error, info};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub enum RuntimeError {
    Db(DbError),
    Source(SourceError),
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Source(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Source(err) => Some(err),
        }
    }
}

impl From<DbError> for RuntimeError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<SourceError> for RuntimeError {
    fn from(value: SourceError) -> Self {
        Self::Source(value)
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Shared handles for one opened profile subsystem.
pub struct CoreRuntime {
    config: CoreConfig,
    conn: SharedConnection,
    files: Arc<ProfileDataFiles>,
    default_records: Arc<dyn DefaultRecords>,
    colors: Arc<dyn ColorAllocator>,
    controller: Arc<ActiveSourceController>,
}

impl CoreRuntime {
    /// Opens the database at `config.db_path` with production seams.
    pub fn open(
        config: CoreConfig,
        default_records: Arc<dyn DefaultRecords>,
    ) -> RuntimeResult<Self> {
        let started_at = Instant::now();
        let conn = match db::open_db(&config.db_path) {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=runtime_open module=runtime status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };
        let runtime = Self::open_with(
            config,
            conn,
            default_records,
            Arc::new(PaletteColorAllocator),
            Arc::new(SystemClock),
        )?;
        info!(
            "event=runtime_open module=runtime status=ok variant={} duration_ms={}",
            runtime.config.variant,
            started_at.elapsed().as_millis()
        );
        Ok(runtime)
    }

    /// Builds a runtime over an already migrated connection and custom seams.
    pub fn open_with(
        config: CoreConfig,
        conn: Connection,
        default_records: Arc<dyn DefaultRecords>,
        colors: Arc<dyn ColorAllocator>,
        clock: Arc<dyn Clock>,
    ) -> RuntimeResult<Self> {
        let conn = db::share(conn);
        let files = Arc::new(ProfileDataFiles::new(&config.data_dir));
        let controller = Arc::new(ActiveSourceController::new(
            conn.clone(),
            files.clone(),
            default_records.clone(),
            clock,
            config.quiet_period,
        )?);
        Ok(Self {
            config,
            conn,
            files,
            default_records,
            colors,
            controller,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn connection(&self) -> SharedConnection {
        self.conn.clone()
    }

    pub fn files(&self) -> Arc<ProfileDataFiles> {
        self.files.clone()
    }

    pub fn controller(&self) -> Arc<ActiveSourceController> {
        self.controller.clone()
    }

    pub fn profiles(&self) -> ProfileService {
        ProfileService::new(self.conn.clone(), self.files.clone(), self.controller.clone())
    }

    pub fn importer(&self) -> ShareImporter {
        ShareImporter::new(
            self.conn.clone(),
            self.files.clone(),
            self.colors.clone(),
            self.config.variant,
        )
    }

    pub fn exporter(&self) -> ShareExporter {
        ShareExporter::new(
            self.conn.clone(),
            self.default_records.clone(),
            self.config.variant,
            &self.config.export_dir,
            self.config.event_year,
        )
    }

    /// Validates, commits and switches to an incoming share file.
    ///
    /// `is_update` must match the decision shown to the user.
    pub fn import_and_activate(
        &self,
        path: impl AsRef<Path>,
        chosen_label: &str,
        is_update: bool,
    ) -> Result<ImportOutcome, ImportError> {
        let importer = self.importer();
        let envelope = importer.validate_and_parse(path)?;
        let outcome = importer.commit(&envelope, chosen_label, is_update)?;
        if let Err(err) = self
            .controller
            .set_active_source(&outcome.metadata.identity)
        {
            // The import itself is durable; only the switch failed.
            error!(
                "event=share_import module=runtime status=error stage=switch identity={} error={}",
                outcome.metadata.identity, err
            );
        }
        Ok(outcome)
    }
}

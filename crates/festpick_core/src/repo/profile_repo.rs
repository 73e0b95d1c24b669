//! Profile metadata repository (Local Store).
//!
//! # Responsibility
//! - Persist one metadata row per profile identity.
//! - Own lazy creation of the reserved `"Default"` row.
//!
//! # Invariants
//! - `identity` is the primary key; upserts never create duplicates.
//! - Upserts preserve the stored `color` (first write wins).
//! - `"Default"` is created on first access and is never deleted.
//! - Listing is deterministic: Default first, then `label ASC, identity ASC`.

use crate::db::migrations::reapply_all;
use crate::db::DbError;
use crate::model::profile::{
    is_default_identity, now_epoch_ms, ProfileId, ProfileMetadata, ProfileValidationError,
    DEFAULT_PROFILE_ID,
};
use log::{error, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const PROFILE_SELECT_SQL: &str = "SELECT
    identity,
    label,
    color,
    import_date,
    share_date,
    event_year,
    priority_count,
    attendance_count,
    is_read_only
FROM profiles";

pub type ProfileRepoResult<T> = Result<T, ProfileRepoError>;

/// Errors from Local Store operations.
#[derive(Debug)]
pub enum ProfileRepoError {
    Validation(ProfileValidationError),
    Db(DbError),
    NotFound(ProfileId),
    /// Required table is missing from the connection schema.
    MissingRequiredTable(&'static str),
    InvalidData(String),
}

impl Display for ProfileRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(identity) => write!(f, "profile not found: {identity}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "profile repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted profile data: {message}"),
        }
    }
}

impl Error for ProfileRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::MissingRequiredTable(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ProfileValidationError> for ProfileRepoError {
    fn from(value: ProfileValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for ProfileRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ProfileRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for profile metadata.
pub trait ProfileRepository {
    /// Inserts or replaces a row by identity, keeping any stored color.
    fn upsert_profile(&self, metadata: &ProfileMetadata) -> ProfileRepoResult<()>;
    /// Gets one row. `"Default"` is created on demand and always returned.
    fn get_profile(&self, identity: &str) -> ProfileRepoResult<Option<ProfileMetadata>>;
    /// Lists every row, Default first.
    fn list_profiles(&self) -> ProfileRepoResult<Vec<ProfileMetadata>>;
    /// Removes one row. Returns `false` for `"Default"` or a missing row.
    fn delete_profile(&self, identity: &str) -> ProfileRepoResult<bool>;
    fn update_label(&self, identity: &str, label: &str) -> ProfileRepoResult<()>;
    fn update_color(&self, identity: &str, color: &str) -> ProfileRepoResult<()>;
    /// Refreshes the denormalized record counters.
    fn update_counts(
        &self,
        identity: &str,
        priority_count: u32,
        attendance_count: u32,
    ) -> ProfileRepoResult<()>;
}

/// SQLite-backed Local Store.
pub struct SqliteProfileRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProfileRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// A connection missing the `profiles` table gets one repair attempt
    /// before the repository gives up.
    pub fn try_new(conn: &'conn Connection) -> ProfileRepoResult<Self> {
        if !profiles_table_exists(conn)? {
            warn!("event=profile_store_init module=repo status=retry reason=missing_table");
            reapply_all(conn)?;
            if !profiles_table_exists(conn)? {
                return Err(ProfileRepoError::MissingRequiredTable("profiles"));
            }
        }
        Ok(Self { conn })
    }

    /// Returns the Default row, creating it when absent.
    ///
    /// Creation is retried once after replaying the schema.
    fn ensure_default(&self) -> ProfileRepoResult<ProfileMetadata> {
        if let Some(existing) = self.select_profile(DEFAULT_PROFILE_ID)? {
            return Ok(existing);
        }

        let row = ProfileMetadata::default_profile(now_epoch_ms());
        if let Err(first) = self.insert_default(&row) {
            warn!(
                "event=default_profile_create module=repo status=retry error={}",
                first
            );
            reapply_all(self.conn)?;
            if let Err(second) = self.insert_default(&row) {
                error!(
                    "event=default_profile_create module=repo status=error error={}",
                    second
                );
                return Err(second);
            }
        }

        self.select_profile(DEFAULT_PROFILE_ID)?
            .ok_or_else(|| ProfileRepoError::NotFound(DEFAULT_PROFILE_ID.to_string()))
    }

    fn insert_default(&self, row: &ProfileMetadata) -> ProfileRepoResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO profiles (
                identity,
                label,
                color,
                import_date,
                share_date,
                event_year,
                priority_count,
                attendance_count,
                is_read_only
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                row.identity.as_str(),
                row.label.as_str(),
                row.color.as_str(),
                row.import_date,
                row.share_date,
                row.event_year,
                row.priority_count,
                row.attendance_count,
                bool_to_int(row.is_read_only),
            ],
        )?;
        Ok(())
    }

    fn select_profile(&self, identity: &str) -> ProfileRepoResult<Option<ProfileMetadata>> {
        let sql = format!("{PROFILE_SELECT_SQL} WHERE identity = ?1;");
        let raw = self
            .conn
            .query_row(&sql, [identity], read_raw_profile)
            .optional()?;
        raw.map(RawProfile::into_metadata).transpose()
    }
}

impl ProfileRepository for SqliteProfileRepository<'_> {
    fn upsert_profile(&self, metadata: &ProfileMetadata) -> ProfileRepoResult<()> {
        metadata.validate()?;

        self.conn.execute(
            "INSERT INTO profiles (
                identity,
                label,
                color,
                import_date,
                share_date,
                event_year,
                priority_count,
                attendance_count,
                is_read_only
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(identity) DO UPDATE SET
                label = excluded.label,
                import_date = excluded.import_date,
                share_date = excluded.share_date,
                event_year = excluded.event_year,
                priority_count = excluded.priority_count,
                attendance_count = excluded.attendance_count,
                is_read_only = excluded.is_read_only;",
            params![
                metadata.identity.as_str(),
                metadata.label.trim(),
                metadata.color.trim(),
                metadata.import_date,
                metadata.share_date,
                metadata.event_year,
                metadata.priority_count,
                metadata.attendance_count,
                bool_to_int(metadata.is_read_only),
            ],
        )?;

        Ok(())
    }

    fn get_profile(&self, identity: &str) -> ProfileRepoResult<Option<ProfileMetadata>> {
        if is_default_identity(identity) {
            return self.ensure_default().map(Some);
        }
        self.select_profile(identity)
    }

    fn list_profiles(&self) -> ProfileRepoResult<Vec<ProfileMetadata>> {
        self.ensure_default()?;

        let sql = format!(
            "{PROFILE_SELECT_SQL}
             ORDER BY
                CASE WHEN identity = ?1 THEN 0 ELSE 1 END,
                label COLLATE NOCASE ASC,
                identity ASC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([DEFAULT_PROFILE_ID], read_raw_profile)?;

        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?.into_metadata()?);
        }
        Ok(profiles)
    }

    fn delete_profile(&self, identity: &str) -> ProfileRepoResult<bool> {
        if is_default_identity(identity) {
            warn!("event=profile_delete module=repo status=rejected reason=default_profile");
            return Ok(false);
        }

        let changed = self
            .conn
            .execute("DELETE FROM profiles WHERE identity = ?1;", [identity])?;
        Ok(changed > 0)
    }

    fn update_label(&self, identity: &str, label: &str) -> ProfileRepoResult<()> {
        if label.trim().is_empty() {
            return Err(ProfileValidationError::BlankLabel.into());
        }
        self.update_column(identity, "label", label)
    }

    fn update_color(&self, identity: &str, color: &str) -> ProfileRepoResult<()> {
        if color.trim().is_empty() {
            return Err(ProfileValidationError::BlankColor.into());
        }
        self.update_column(identity, "color", color)
    }

    fn update_counts(
        &self,
        identity: &str,
        priority_count: u32,
        attendance_count: u32,
    ) -> ProfileRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE profiles
             SET priority_count = ?2, attendance_count = ?3
             WHERE identity = ?1;",
            params![identity, priority_count, attendance_count],
        )?;
        if changed == 0 {
            return Err(ProfileRepoError::NotFound(identity.to_string()));
        }
        Ok(())
    }
}

impl SqliteProfileRepository<'_> {
    fn update_column(
        &self,
        identity: &str,
        column: &'static str,
        value: &str,
    ) -> ProfileRepoResult<()> {
        // Default is materialized first so renaming/recoloring it never
        // reports NotFound on a fresh store.
        if is_default_identity(identity) {
            self.ensure_default()?;
        }

        let changed = self.conn.execute(
            &format!("UPDATE profiles SET {column} = ?2 WHERE identity = ?1;"),
            params![identity, value.trim()],
        )?;
        if changed == 0 {
            return Err(ProfileRepoError::NotFound(identity.to_string()));
        }
        Ok(())
    }
}

struct RawProfile {
    identity: String,
    label: String,
    color: String,
    import_date: i64,
    share_date: i64,
    event_year: i64,
    priority_count: i64,
    attendance_count: i64,
    is_read_only: i64,
}

impl RawProfile {
    fn into_metadata(self) -> ProfileRepoResult<ProfileMetadata> {
        let event_year = i32::try_from(self.event_year).map_err(|_| {
            ProfileRepoError::InvalidData(format!(
                "event_year `{}` out of range for `{}`",
                self.event_year, self.identity
            ))
        })?;
        let priority_count = count_from_db(self.priority_count, "priority_count", &self.identity)?;
        let attendance_count =
            count_from_db(self.attendance_count, "attendance_count", &self.identity)?;
        let is_read_only = match self.is_read_only {
            0 => false,
            1 => true,
            other => {
                return Err(ProfileRepoError::InvalidData(format!(
                    "is_read_only `{other}` is not boolean for `{}`",
                    self.identity
                )))
            }
        };

        Ok(ProfileMetadata {
            identity: self.identity,
            label: self.label,
            color: self.color,
            import_date: self.import_date,
            share_date: self.share_date,
            event_year,
            priority_count,
            attendance_count,
            is_read_only,
        })
    }
}

fn read_raw_profile(row: &Row<'_>) -> rusqlite::Result<RawProfile> {
    Ok(RawProfile {
        identity: row.get("identity")?,
        label: row.get("label")?,
        color: row.get("color")?,
        import_date: row.get("import_date")?,
        share_date: row.get("share_date")?,
        event_year: row.get("event_year")?,
        priority_count: row.get("priority_count")?,
        attendance_count: row.get("attendance_count")?,
        is_read_only: row.get("is_read_only")?,
    })
}

fn count_from_db(value: i64, column: &str, identity: &str) -> ProfileRepoResult<u32> {
    u32::try_from(value).map_err(|_| {
        ProfileRepoError::InvalidData(format!(
            "{column} `{value}` out of range for `{identity}`"
        ))
    })
}

fn profiles_table_exists(conn: &Connection) -> ProfileRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = 'profiles'
        );",
        [],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::{ProfileRepository, SqliteProfileRepository};
    use crate::db::open_db_in_memory;
    use crate::model::profile::DEFAULT_PROFILE_ID;

    #[test]
    fn try_new_repairs_dropped_table() {
        let conn = open_db_in_memory().unwrap();
        conn.execute_batch("DROP TABLE profiles;").unwrap();

        let repo = SqliteProfileRepository::try_new(&conn).unwrap();
        let listed = repo.list_profiles().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].identity, DEFAULT_PROFILE_ID);
    }

    #[test]
    fn renaming_default_on_fresh_store_materializes_it() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteProfileRepository::try_new(&conn).unwrap();
        repo.update_label(DEFAULT_PROFILE_ID, "Mine").unwrap();

        let row = repo.get_profile(DEFAULT_PROFILE_ID).unwrap().unwrap();
        assert_eq!(row.label, "Mine");
    }
}

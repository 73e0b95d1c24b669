//! Small key/value store for process-wide core state.
//!
//! # Responsibility
//! - Persist the active source identity across restarts.
//! - Persist the per-install sender identity embedded in exports.
//!
//! # Invariants
//! - The sender identity is generated once and never rotated.

use crate::db::DbResult;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

const KEY_ACTIVE_SOURCE: &str = "active_source";
const KEY_INSTALL_IDENTITY: &str = "install_identity";

/// SQLite-backed `app_state` accessor.
pub struct AppStateRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> AppStateRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_value(&self, key: &str) -> DbResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM app_state WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_value(&self, key: &str, value: &str) -> DbResult<()> {
        self.conn.execute(
            "INSERT INTO app_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![key, value],
        )?;
        Ok(())
    }

    /// Persisted active source, if one was ever stored.
    pub fn active_source(&self) -> DbResult<Option<String>> {
        self.get_value(KEY_ACTIVE_SOURCE)
    }

    pub fn set_active_source(&self, identity: &str) -> DbResult<()> {
        self.set_value(KEY_ACTIVE_SOURCE, identity)
    }

    /// Returns this install's sender identity, generating it on first use.
    pub fn install_identity(&self) -> DbResult<String> {
        if let Some(existing) = self
            .get_value(KEY_INSTALL_IDENTITY)?
            .filter(|value| !value.trim().is_empty())
        {
            return Ok(existing);
        }

        let generated = Uuid::new_v4().to_string();
        // A concurrent writer may have won; keep whichever row landed first.
        self.conn.execute(
            "INSERT OR IGNORE INTO app_state (key, value) VALUES (?1, ?2);",
            params![KEY_INSTALL_IDENTITY, generated.as_str()],
        )?;
        Ok(self
            .get_value(KEY_INSTALL_IDENTITY)?
            .unwrap_or(generated))
    }
}

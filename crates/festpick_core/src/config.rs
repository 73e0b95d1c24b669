//! Core configuration.
//!
//! # Responsibility
//! - Resolve storage locations, share variant, event year and quiet period.
//! - Apply `FESTPICK_*` environment overrides on top of defaults.
//!
//! # Invariants
//! - Invalid environment values are reported, never silently ignored.

use crate::share::ShareVariant;
use chrono::{Datelike, Utc};
use crate::source::DEFAULT_QUIET_PERIOD;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "FESTPICK_DB_PATH";
pub const ENV_DATA_DIR: &str = "FESTPICK_DATA_DIR";
pub const ENV_EXPORT_DIR: &str = "FESTPICK_EXPORT_DIR";
pub const ENV_EVENT_YEAR: &str = "FESTPICK_EVENT_YEAR";
pub const ENV_VARIANT: &str = "FESTPICK_VARIANT";
pub const ENV_QUIET_PERIOD_MS: &str = "FESTPICK_QUIET_PERIOD_MS";

const DEFAULT_BASE_DIR_NAME: &str = "festpick";
const DB_FILE_NAME: &str = "festpick.sqlite3";
const EXPORT_DIR_NAME: &str = "exports";

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: &'static str,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid value `{}` for {}: {}",
            self.value, self.key, self.reason
        )
    }
}

impl Error for ConfigError {}

/// Resolved settings for one core runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// SQLite file holding profile metadata and app state.
    pub db_path: PathBuf,
    /// Root of per-profile data files.
    pub data_dir: PathBuf,
    /// Where exported share files are written.
    pub export_dir: PathBuf,
    /// Event year embedded in exports.
    pub event_year: i32,
    /// Product variant of this build.
    pub variant: ShareVariant,
    /// Quiet window opened by every source switch.
    pub quiet_period: Duration,
}

impl CoreConfig {
    /// Defaults rooted at one base directory.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            db_path: base_dir.join(DB_FILE_NAME),
            data_dir: base_dir.clone(),
            export_dir: base_dir.join(EXPORT_DIR_NAME),
            event_year: current_year(),
            variant: ShareVariant::Festival,
            quiet_period: DEFAULT_QUIET_PERIOD,
        }
    }

    /// Defaults plus overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults plus overrides from an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let base_dir = value(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_BASE_DIR_NAME));
        let mut config = Self::with_base_dir(base_dir);

        if let Some(raw) = value(ENV_DB_PATH) {
            config.db_path = PathBuf::from(raw);
        }
        if let Some(raw) = value(ENV_EXPORT_DIR) {
            config.export_dir = PathBuf::from(raw);
        }
        if let Some(raw) = value(ENV_EVENT_YEAR) {
            config.event_year = raw.parse::<i32>().map_err(|_| ConfigError {
                key: ENV_EVENT_YEAR,
                value: raw.clone(),
                reason: "expected an integer year",
            })?;
        }
        if let Some(raw) = value(ENV_VARIANT) {
            config.variant = ShareVariant::parse(&raw).ok_or(ConfigError {
                key: ENV_VARIANT,
                value: raw.clone(),
                reason: "expected festival|cruise",
            })?;
        }
        if let Some(raw) = value(ENV_QUIET_PERIOD_MS) {
            let millis = raw.parse::<u64>().map_err(|_| ConfigError {
                key: ENV_QUIET_PERIOD_MS,
                value: raw.clone(),
                reason: "expected milliseconds",
            })?;
            config.quiet_period = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

/// Year of the current UTC date.
fn current_year() -> i32 {
    Utc::now().year()
}

#[cfg(test)]
mod tests {
    use super::{
        current_year, CoreConfig, ENV_DATA_DIR, ENV_EVENT_YEAR, ENV_QUIET_PERIOD_MS, ENV_VARIANT,
    };
    use crate::share::ShareVariant;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_apply_on_top_of_base_dir() {
        let config = CoreConfig::from_lookup(lookup(&[
            (ENV_DATA_DIR, "/var/festpick"),
            (ENV_EVENT_YEAR, "2026"),
            (ENV_VARIANT, "Cruise"),
            (ENV_QUIET_PERIOD_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/festpick"));
        assert_eq!(config.db_path, PathBuf::from("/var/festpick/festpick.sqlite3"));
        assert_eq!(config.export_dir, PathBuf::from("/var/festpick/exports"));
        assert_eq!(config.event_year, 2026);
        assert_eq!(config.variant, ShareVariant::Cruise);
        assert_eq!(config.quiet_period, Duration::from_millis(250));
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = CoreConfig::from_lookup(lookup(&[(ENV_EVENT_YEAR, "soon")])).unwrap_err();
        assert_eq!(err.key, ENV_EVENT_YEAR);

        let err = CoreConfig::from_lookup(lookup(&[(ENV_VARIANT, "arena")])).unwrap_err();
        assert_eq!(err.key, ENV_VARIANT);
    }

    #[test]
    fn event_year_defaults_to_current_year() {
        let config = CoreConfig::from_lookup(lookup(&[(ENV_DATA_DIR, "/var/festpick")])).unwrap();
        assert_eq!(config.event_year, current_year());
        assert!(config.event_year >= 2024);
    }
}

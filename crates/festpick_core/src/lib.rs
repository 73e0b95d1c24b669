//! Core domain logic for FestPick side-by-side profiles.
//! This crate is the single source of truth for profile invariants.

pub mod config;
pub mod db;
pub mod files;
pub mod logging;
pub mod model;
pub mod repo;
pub mod runtime;
pub mod service;
pub mod share;
pub mod source;

pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::profile::{ProfileId, ProfileMetadata, DEFAULT_PROFILE_ID};
pub use model::ranking::{AttendanceStatus, PriorityRank, WireCode};
pub use repo::profile_repo::{
    ProfileRepoError, ProfileRepoResult, ProfileRepository, SqliteProfileRepository,
};
pub use runtime::{CoreRuntime, RuntimeError};
pub use service::profile_service::{
    ProfileService, ProfileServiceError, ProfileServiceResult, ProfileSummary,
};
pub use share::{ImportDecision, ShareEnvelope, ShareVariant};
pub use source::{ActiveSourceController, DefaultRecords, MemoryDefaultRecords};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

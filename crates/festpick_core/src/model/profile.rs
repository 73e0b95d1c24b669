//! Profile metadata model.
//!
//! # Responsibility
//! - Define the metadata row kept for the local user and each imported
//!   profile.
//! - Provide the reserved `"Default"` identity and its lazily created row.
//!
//! # Invariants
//! - `identity` is the primary key and never changes after creation.
//! - `color` is assigned once; re-imports never overwrite it.
//! - `"Default"` always exists and can never be deleted.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stable profile identity. `"Default"` or a sender device identifier.
pub type ProfileId = String;

/// Reserved identity for the local user's own records.
pub const DEFAULT_PROFILE_ID: &str = "Default";
/// Display label given to the lazily created Default row.
pub const DEFAULT_PROFILE_LABEL: &str = "Default";
/// Sentinel color token for the Default row.
pub const DEFAULT_PROFILE_COLOR: &str = "#FFFFFF";

/// Metadata row for one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    /// Primary key. Never edited.
    pub identity: ProfileId,
    /// User-facing display name.
    pub label: String,
    /// Color token chosen by the color allocator on first import.
    pub color: String,
    /// Epoch milliseconds of the most recent import commit.
    pub import_date: i64,
    /// Epoch milliseconds embedded by the sender at export time.
    pub share_date: i64,
    pub event_year: i32,
    pub priority_count: u32,
    pub attendance_count: u32,
    pub is_read_only: bool,
}

impl ProfileMetadata {
    /// Builds the row persisted on first access to `"Default"`.
    pub fn default_profile(now_ms: i64) -> Self {
        Self {
            identity: DEFAULT_PROFILE_ID.to_string(),
            label: DEFAULT_PROFILE_LABEL.to_string(),
            color: DEFAULT_PROFILE_COLOR.to_string(),
            import_date: now_ms,
            share_date: now_ms,
            event_year: 0,
            priority_count: 0,
            attendance_count: 0,
            is_read_only: false,
        }
    }

    pub fn is_default(&self) -> bool {
        is_default_identity(&self.identity)
    }

    /// Validates write-time invariants.
    pub fn validate(&self) -> Result<(), ProfileValidationError> {
        if self.identity.trim().is_empty() {
            return Err(ProfileValidationError::BlankIdentity);
        }
        if self.label.trim().is_empty() {
            return Err(ProfileValidationError::BlankLabel);
        }
        if self.color.trim().is_empty() {
            return Err(ProfileValidationError::BlankColor);
        }
        Ok(())
    }
}

/// Returns whether `identity` names the local user's own profile.
pub fn is_default_identity(identity: &str) -> bool {
    identity == DEFAULT_PROFILE_ID
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Write-time validation failures for `ProfileMetadata`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileValidationError {
    BlankIdentity,
    BlankLabel,
    BlankColor,
}

impl Display for ProfileValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankIdentity => write!(f, "profile identity must not be blank"),
            Self::BlankLabel => write!(f, "profile label must not be blank"),
            Self::BlankColor => write!(f, "profile color must not be blank"),
        }
    }
}

impl Error for ProfileValidationError {}

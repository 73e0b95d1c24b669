//! Seam to the application-wide storage holding the local user's own
//! priorities and attendance.

use crate::model::ranking::{AttendanceStatus, PriorityRank};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Application-wide records of the Default profile.
///
/// Implemented outside the core; the controller and exporter only talk to
/// the Default profile through this trait.
pub trait DefaultRecords: Send + Sync {
    /// Rank for one band, `Unknown` when none is recorded.
    fn priority(&self, band: &str) -> PriorityRank;
    /// Status for one event key, `SawNone` when none is recorded.
    fn attendance(&self, event_key: &str) -> AttendanceStatus;
    fn all_priorities(&self) -> BTreeMap<String, PriorityRank>;
    fn all_attendance(&self) -> BTreeMap<String, AttendanceStatus>;
    /// Records one rank. Errors are human-readable storage messages.
    fn set_priority(&self, band: &str, rank: PriorityRank) -> Result<(), String>;
    fn set_attendance(&self, event_key: &str, status: AttendanceStatus) -> Result<(), String>;
}

/// In-memory `DefaultRecords` used by the FFI bridge, the CLI and tests.
///
/// Hosts push their current state in with `replace_all`.
#[derive(Debug, Default)]
pub struct MemoryDefaultRecords {
    priorities: RwLock<BTreeMap<String, PriorityRank>>,
    attendance: RwLock<BTreeMap<String, AttendanceStatus>>,
}

impl MemoryDefaultRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds records from existing maps.
    pub fn with_records(
        priorities: BTreeMap<String, PriorityRank>,
        attendance: BTreeMap<String, AttendanceStatus>,
    ) -> Self {
        Self {
            priorities: RwLock::new(priorities),
            attendance: RwLock::new(attendance),
        }
    }

    /// Replaces every record at once.
    pub fn replace_all(
        &self,
        priorities: BTreeMap<String, PriorityRank>,
        attendance: BTreeMap<String, AttendanceStatus>,
    ) {
        *self
            .priorities
            .write()
            .unwrap_or_else(PoisonError::into_inner) = priorities;
        *self
            .attendance
            .write()
            .unwrap_or_else(PoisonError::into_inner) = attendance;
    }
}

impl DefaultRecords for MemoryDefaultRecords {
    fn priority(&self, band: &str) -> PriorityRank {
        self.priorities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(band)
            .copied()
            .unwrap_or(PriorityRank::Unknown)
    }

    fn attendance(&self, event_key: &str) -> AttendanceStatus {
        self.attendance
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_key)
            .copied()
            .unwrap_or(AttendanceStatus::SawNone)
    }

    fn all_priorities(&self) -> BTreeMap<String, PriorityRank> {
        self.priorities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn all_attendance(&self) -> BTreeMap<String, AttendanceStatus> {
        self.attendance
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_priority(&self, band: &str, rank: PriorityRank) -> Result<(), String> {
        let mut priorities = self
            .priorities
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if rank == PriorityRank::Unknown {
            priorities.remove(band);
        } else {
            priorities.insert(band.to_string(), rank);
        }
        Ok(())
    }

    fn set_attendance(&self, event_key: &str, status: AttendanceStatus) -> Result<(), String> {
        let mut attendance = self
            .attendance
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if status == AttendanceStatus::Unset {
            attendance.remove(event_key);
        } else {
            attendance.insert(event_key.to_string(), status);
        }
        Ok(())
    }
}

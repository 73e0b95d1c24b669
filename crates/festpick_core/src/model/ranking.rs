//! Priority/attendance vocabularies and the wire-code table.
//!
//! # Responsibility
//! - Define `PriorityRank` and `AttendanceStatus`.
//! - Translate both to and from the numeric codes carried by share files and
//!   per-profile data files.
//!
//! # Invariants
//! - The code tables are a cross-platform contract and must never be
//!   renumbered.
//! - Encode and decode read the same table.
//! - Unrecognized codes decode to `Unknown` / `SawNone`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Numeric code as carried in share documents.
pub type WireCode = i64;

/// A user's interest level in one band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityRank {
    Unknown,
    Must,
    Might,
    Wont,
}

/// Whether a user attended one scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Unset,
    SawSome,
    SawAll,
    SawNone,
}

const PRIORITY_CODES: [(PriorityRank, WireCode); 4] = [
    (PriorityRank::Unknown, 0),
    (PriorityRank::Must, 1),
    (PriorityRank::Might, 2),
    (PriorityRank::Wont, 3),
];

const ATTENDANCE_CODES: [(AttendanceStatus, WireCode); 4] = [
    (AttendanceStatus::Unset, 0),
    (AttendanceStatus::SawSome, 1),
    (AttendanceStatus::SawAll, 2),
    (AttendanceStatus::SawNone, 3),
];

impl PriorityRank {
    /// Every rank, in code order.
    pub const ALL: [PriorityRank; 4] = [
        PriorityRank::Unknown,
        PriorityRank::Must,
        PriorityRank::Might,
        PriorityRank::Wont,
    ];

    /// Returns the wire code for this rank.
    pub fn to_code(self) -> WireCode {
        PRIORITY_CODES
            .iter()
            .find(|(rank, _)| *rank == self)
            .map_or(0, |(_, code)| *code)
    }

    /// Returns the rank for a wire code, or `None` when the code is unknown.
    pub fn from_code(code: WireCode) -> Option<Self> {
        PRIORITY_CODES
            .iter()
            .find(|(_, candidate)| *candidate == code)
            .map(|(rank, _)| *rank)
    }

    /// Decodes a wire code, failing closed to `Unknown`.
    pub fn from_code_or_unknown(code: WireCode) -> Self {
        Self::from_code(code).unwrap_or(Self::Unknown)
    }

    /// Stable lowercase name used by FFI/CLI surfaces.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Must => "must",
            Self::Might => "might",
            Self::Wont => "wont",
        }
    }

    /// Parses a lowercase or mixed-case rank name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unknown" => Some(Self::Unknown),
            "must" => Some(Self::Must),
            "might" => Some(Self::Might),
            "wont" | "won't" => Some(Self::Wont),
            _ => None,
        }
    }
}

impl Display for PriorityRank {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AttendanceStatus {
    /// Every status, in code order.
    pub const ALL: [AttendanceStatus; 4] = [
        AttendanceStatus::Unset,
        AttendanceStatus::SawSome,
        AttendanceStatus::SawAll,
        AttendanceStatus::SawNone,
    ];

    pub fn to_code(self) -> WireCode {
        ATTENDANCE_CODES
            .iter()
            .find(|(status, _)| *status == self)
            .map_or(0, |(_, code)| *code)
    }

    pub fn from_code(code: WireCode) -> Option<Self> {
        ATTENDANCE_CODES
            .iter()
            .find(|(_, candidate)| *candidate == code)
            .map(|(status, _)| *status)
    }

    /// Decodes a wire code, failing closed to `SawNone`.
    pub fn from_code_or_saw_none(code: WireCode) -> Self {
        Self::from_code(code).unwrap_or(Self::SawNone)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::SawSome => "saw_some",
            Self::SawAll => "saw_all",
            Self::SawNone => "saw_none",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unset" => Some(Self::Unset),
            "saw_some" | "sawsome" => Some(Self::SawSome),
            "saw_all" | "sawall" => Some(Self::SawAll),
            "saw_none" | "sawnone" => Some(Self::SawNone),
            _ => None,
        }
    }
}

impl Display for AttendanceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

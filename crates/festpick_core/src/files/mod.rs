//! Per-profile data file storage.
//!
//! # Responsibility
//! - Keep each imported profile's priority and attendance maps isolated in
//!   their own directory.
//! - Degrade unreadable data to defaults instead of failing reads.
//!
//! # Invariants
//! - The Default profile's records are never stored here.
//! - Writes replace whole files; a failed write leaves the old file intact.

mod profile_files;

pub use profile_files::{
    is_storable_band, DataFileError, DataFileResult, NamespaceSnapshot, ProfileDataFiles,
};

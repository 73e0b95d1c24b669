//! Profile-sharing domain model.
//!
//! # Responsibility
//! - Define profile metadata and the per-profile record vocabularies.
//! - Own the fixed cross-platform wire-code table.
//!
//! # Invariants
//! - Every profile is identified by a stable identity string.
//! - `"Default"` is reserved for the local user's own data.

pub mod event_key;
pub mod profile;
pub mod ranking;

//! Active-source selection and read/write routing.
//!
//! # Responsibility
//! - Track which profile the rest of the application is looking at.
//! - Route every priority/attendance read and edit to the right storage.
//! - Gate background writers during the quiet window after a switch.
//!
//! # Invariants
//! - The active source is `"Default"` or an identity with stored metadata.
//! - Redirection is total: callers never read Default storage directly.

mod clock;
mod controller;
mod default_records;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{
    ActiveSourceController, SourceError, SourceListener, SourceResult, WriteDenied, WritePermit,
    DEFAULT_QUIET_PERIOD,
};
pub use default_records::{DefaultRecords, MemoryDefaultRecords};

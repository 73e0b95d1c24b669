//! Share file codec and import/export flows.
//!
//! # Responsibility
//! - Define the portable share document and its validation rules.
//! - Export the Default profile's records into a share file.
//! - Import a share file as a new or updated side-by-side profile.
//!
//! # Invariants
//! - A share document that fails validation never changes stored state.
//! - Import is keyed by sender identity; re-imports overwrite, never
//!   duplicate.
//! - Existing profiles keep their label and color on re-import.

mod color;
mod envelope;
mod export;
mod import;

pub use color::{ColorAllocator, PaletteColorAllocator};
pub use envelope::{
    parse_envelope, validate_and_parse, DecodeError, DecodeResult, DecodedAttendance,
    ShareEnvelope, ShareVariant, SHARE_FORMAT_VERSION,
};
pub use export::{ExportError, ExportOutcome, ExportResult, ShareExporter};
pub use import::{
    suggested_label, ImportDecision, ImportError, ImportOutcome, ImportResult, ShareImporter,
    FALLBACK_PROFILE_LABEL,
};

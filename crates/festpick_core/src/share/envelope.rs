//! Share document model, variant detection and validation.

use crate::files::is_storable_band;
use crate::model::event_key::AttendanceKey;
use crate::model::profile::is_default_identity;
use crate::model::ranking::{AttendanceStatus, PriorityRank, WireCode};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};

/// Format version written by this build.
pub const SHARE_FORMAT_VERSION: &str = "1.0";
const SUPPORTED_MAJOR_VERSION: u32 = 1;

/// Product variant that produced a share file.
///
/// Both variants use the same document layout; only the file extension
/// tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareVariant {
    Festival,
    Cruise,
}

impl ShareVariant {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Festival => "festshare",
            Self::Cruise => "cruiseshare",
        }
    }

    /// Maps a file extension back to its variant.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "festshare" => Some(Self::Festival),
            "cruiseshare" => Some(Self::Cruise),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Festival => "festival",
            Self::Cruise => "cruise",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "festival" => Some(Self::Festival),
            "cruise" => Some(Self::Cruise),
            _ => None,
        }
    }
}

impl Display for ShareVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Portable share document.
///
/// Disposable: once decoded into per-profile files it is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareEnvelope {
    /// Stable identifier of the sending install. Required, non-blank.
    #[serde(default)]
    pub sender_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Epoch milliseconds at export time.
    pub share_date: i64,
    pub event_year: i32,
    #[serde(default = "default_version")]
    pub version: String,
    /// Band name to priority wire code.
    #[serde(default)]
    pub priorities: BTreeMap<String, WireCode>,
    /// Composite event key to attendance wire code.
    #[serde(default)]
    pub attendance: BTreeMap<String, WireCode>,
}

fn default_version() -> String {
    SHARE_FORMAT_VERSION.to_string()
}

/// Attendance entries decoded from an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedAttendance {
    pub entries: BTreeMap<String, AttendanceStatus>,
    /// Keys dropped because they do not parse as composite event keys.
    pub rejected_keys: Vec<String>,
}

impl ShareEnvelope {
    /// Serializes the envelope as pretty JSON.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    /// Decodes priority codes, failing closed to `Unknown`.
    ///
    /// Blank band names and names with line breaks are dropped and logged.
    pub fn decode_priorities(&self) -> BTreeMap<String, PriorityRank> {
        let mut decoded = BTreeMap::new();
        for (band, code) in &self.priorities {
            if !is_storable_band(band) {
                warn!("event=share_decode module=share status=skip kind=band_name");
                continue;
            }
            decoded.insert(band.clone(), PriorityRank::from_code_or_unknown(*code));
        }
        decoded
    }

    /// Decodes attendance codes, failing closed to `SawNone`.
    ///
    /// Malformed composite keys are rejected and reported, never guessed.
    pub fn decode_attendance(&self) -> DecodedAttendance {
        let mut decoded = DecodedAttendance::default();
        for (key, code) in &self.attendance {
            match AttendanceKey::parse(key) {
                Ok(_) => {
                    decoded.entries.insert(
                        key.clone(),
                        AttendanceStatus::from_code_or_saw_none(*code),
                    );
                }
                Err(err) => {
                    warn!(
                        "event=share_decode module=share status=skip kind=attendance_key reason={}",
                        err
                    );
                    decoded.rejected_keys.push(key.clone());
                }
            }
        }
        decoded
    }

    fn validate(mut self) -> DecodeResult<Self> {
        let sender = self.sender_user_id.trim().to_string();
        if sender.is_empty() {
            return Err(DecodeError::MissingSenderIdentity);
        }
        if is_default_identity(&sender) {
            return Err(DecodeError::ReservedSenderIdentity(sender));
        }
        self.sender_user_id = sender;

        let major = self
            .version
            .trim()
            .split('.')
            .next()
            .and_then(|part| part.parse::<u32>().ok());
        if major != Some(SUPPORTED_MAJOR_VERSION) {
            return Err(DecodeError::UnsupportedVersion(self.version));
        }
        Ok(self)
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Reasons a share document is rejected as invalid.
#[derive(Debug)]
pub enum DecodeError {
    Io { path: PathBuf, source: io::Error },
    Json(serde_json::Error),
    MissingSenderIdentity,
    ReservedSenderIdentity(String),
    UnsupportedVersion(String),
    /// File was produced by the other product variant.
    VariantMismatch {
        expected: ShareVariant,
        found: ShareVariant,
    },
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read share file `{}`: {source}", path.display())
            }
            Self::Json(err) => write!(f, "invalid share document: {err}"),
            Self::MissingSenderIdentity => write!(f, "share document has no senderUserId"),
            Self::ReservedSenderIdentity(identity) => {
                write!(f, "share document uses reserved sender identity `{identity}`")
            }
            Self::UnsupportedVersion(version) => {
                write!(f, "unsupported share document version `{version}`")
            }
            Self::VariantMismatch { expected, found } => write!(
                f,
                "share file was made by the {found} app, expected {expected}"
            ),
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Decodes and validates an in-memory share document.
pub fn parse_envelope(bytes: &[u8]) -> DecodeResult<ShareEnvelope> {
    serde_json::from_slice::<ShareEnvelope>(bytes)?.validate()
}

/// Reads, decodes and validates a share file.
///
/// Files carrying the other variant's extension are rejected; unknown
/// extensions are accepted since delivery channels may rename files.
pub fn validate_and_parse(
    path: impl AsRef<Path>,
    local_variant: ShareVariant,
) -> DecodeResult<ShareEnvelope> {
    let path = path.as_ref();
    let found = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ShareVariant::from_extension);
    if let Some(found) = found.filter(|found| *found != local_variant) {
        return Err(DecodeError::VariantMismatch {
            expected: local_variant,
            found,
        });
    }

    let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_envelope(&bytes)
}

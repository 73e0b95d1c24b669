//! File-backed priority/attendance storage, one namespace per identity.

use crate::model::profile::is_default_identity;
use crate::model::ranking::{AttendanceStatus, PriorityRank, WireCode};
use log::{info, warn};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const PROFILES_DIR: &str = "profiles";
const PRIORITIES_FILE: &str = "priorities.txt";
const ATTENDANCE_FILE: &str = "attendance.json";
const TEMP_SUFFIX: &str = ".tmp";
const ENTRY_SEPARATOR: char = ':';

pub type DataFileResult<T> = Result<T, DataFileError>;

/// Storage faults for per-profile files.
#[derive(Debug)]
pub enum DataFileError {
    Io { path: PathBuf, source: io::Error },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Identity is blank or names the Default profile.
    ReservedIdentity(String),
    /// Band name is blank or spans more than one line.
    InvalidBand(String),
}

impl Display for DataFileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "profile file io error at `{}`: {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "profile file json error at `{}`: {source}", path.display())
            }
            Self::ReservedIdentity(identity) => {
                write!(f, "identity `{identity}` has no per-profile files")
            }
            Self::InvalidBand(band) => write!(f, "band name {band:?} cannot be stored"),
        }
    }
}

impl Error for DataFileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::ReservedIdentity(_) | Self::InvalidBand(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct ProfileData {
    priorities: BTreeMap<String, PriorityRank>,
    attendance: BTreeMap<String, AttendanceStatus>,
}

/// Cached reads plus a per-identity generation bumped on every invalidation.
///
/// A load only lands in `entries` when the generation it started from is
/// still current, so a read racing a write cannot cache the old files.
#[derive(Debug, Default)]
struct ReadCache {
    entries: HashMap<String, Arc<ProfileData>>,
    generations: HashMap<String, u64>,
}

impl ReadCache {
    fn generation(&self, identity: &str) -> u64 {
        self.generations.get(identity).copied().unwrap_or(0)
    }
}

/// Raw file contents of one namespace, taken before a replace so a failed
/// import can put them back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSnapshot {
    identity: String,
    priorities: Option<Vec<u8>>,
    attendance: Option<Vec<u8>>,
}

impl NamespaceSnapshot {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// True when neither file existed.
    pub fn is_empty(&self) -> bool {
        self.priorities.is_none() && self.attendance.is_none()
    }
}

/// Returns whether `band` can be stored as one `band:code` line.
pub fn is_storable_band(band: &str) -> bool {
    !band.trim().is_empty() && !band.contains(['\n', '\r'])
}

/// Per-profile data files rooted at `<data_dir>/profiles`.
///
/// Reads are served from an in-memory cache that writes and deletes
/// invalidate. Safe to share between threads.
#[derive(Debug)]
pub struct ProfileDataFiles {
    root: PathBuf,
    cache: Mutex<ReadCache>,
}

impl ProfileDataFiles {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().join(PROFILES_DIR),
            cache: Mutex::new(ReadCache::default()),
        }
    }

    /// Root directory holding every profile namespace.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the namespace directory for one identity.
    pub fn namespace_dir(&self, identity: &str) -> DataFileResult<PathBuf> {
        if identity.trim().is_empty() || is_default_identity(identity) {
            return Err(DataFileError::ReservedIdentity(identity.to_string()));
        }
        Ok(self.root.join(encode_namespace(identity)))
    }

    /// Replaces every stored priority for `identity`.
    ///
    /// Stored as sorted `band:code` lines so one bad line cannot hide the
    /// rest. Bands that are blank or contain a line break are rejected.
    pub fn write_priorities(
        &self,
        identity: &str,
        priorities: &BTreeMap<String, PriorityRank>,
    ) -> DataFileResult<()> {
        let path = self.namespace_dir(identity)?.join(PRIORITIES_FILE);
        let body = encode_priorities(priorities)?;

        write_atomically(&path, body.as_bytes())?;
        self.invalidate(identity);
        info!(
            "event=profile_files_write module=files status=ok kind=priorities identity={} count={}",
            identity,
            priorities.len()
        );
        Ok(())
    }

    /// Replaces every stored attendance status for `identity` in one
    /// structured write.
    pub fn write_attendance(
        &self,
        identity: &str,
        attendance: &BTreeMap<String, AttendanceStatus>,
    ) -> DataFileResult<()> {
        let path = self.namespace_dir(identity)?.join(ATTENDANCE_FILE);
        let body = encode_attendance(&path, attendance)?;

        write_atomically(&path, &body)?;
        self.invalidate(identity);
        info!(
            "event=profile_files_write module=files status=ok kind=attendance identity={} count={}",
            identity,
            attendance.len()
        );
        Ok(())
    }

    /// Replaces both files for `identity`.
    ///
    /// Both bodies are staged next to their targets before either target is
    /// touched. If a staging step fails, nothing changes. If the second
    /// rename fails, the priorities file is already new; callers holding a
    /// [`NamespaceSnapshot`] put it back with [`Self::restore`].
    pub fn replace_all(
        &self,
        identity: &str,
        priorities: &BTreeMap<String, PriorityRank>,
        attendance: &BTreeMap<String, AttendanceStatus>,
    ) -> DataFileResult<()> {
        let dir = self.namespace_dir(identity)?;
        let priorities_path = dir.join(PRIORITIES_FILE);
        let attendance_path = dir.join(ATTENDANCE_FILE);
        let priorities_body = encode_priorities(priorities)?;
        let attendance_body = encode_attendance(&attendance_path, attendance)?;

        let staged_priorities = stage(&priorities_path, priorities_body.as_bytes())?;
        let staged_attendance = match stage(&attendance_path, &attendance_body) {
            Ok(staged) => staged,
            Err(err) => {
                discard_staged(&staged_priorities);
                return Err(err);
            }
        };

        if let Err(err) = promote(&staged_priorities, &priorities_path) {
            discard_staged(&staged_attendance);
            return Err(err);
        }
        let promoted = promote(&staged_attendance, &attendance_path);
        self.invalidate(identity);
        promoted?;

        info!(
            "event=profile_files_write module=files status=ok kind=all identity={} priorities={} attendance={}",
            identity,
            priorities.len(),
            attendance.len()
        );
        Ok(())
    }

    /// Captures the raw bytes of both files. Missing files are recorded as
    /// absent; any other read fault is an error.
    pub fn snapshot(&self, identity: &str) -> DataFileResult<NamespaceSnapshot> {
        let dir = self.namespace_dir(identity)?;
        Ok(NamespaceSnapshot {
            identity: identity.to_string(),
            priorities: read_raw(&dir.join(PRIORITIES_FILE))?,
            attendance: read_raw(&dir.join(ATTENDANCE_FILE))?,
        })
    }

    /// Puts the files back exactly as `snapshot` saw them.
    pub fn restore(&self, snapshot: &NamespaceSnapshot) -> DataFileResult<()> {
        let dir = self.namespace_dir(&snapshot.identity)?;
        let restored = restore_file(&dir.join(PRIORITIES_FILE), snapshot.priorities.as_deref())
            .and_then(|()| {
                restore_file(&dir.join(ATTENDANCE_FILE), snapshot.attendance.as_deref())
            });
        self.invalidate(&snapshot.identity);
        restored?;
        info!(
            "event=profile_files_restore module=files status=ok identity={}",
            snapshot.identity
        );
        Ok(())
    }

    /// Reads one band's rank, `Unknown` when absent or unreadable.
    pub fn read_priority(&self, identity: &str, band: &str) -> PriorityRank {
        self.load(identity)
            .priorities
            .get(band)
            .copied()
            .unwrap_or(PriorityRank::Unknown)
    }

    /// Reads one event's status, `SawNone` when absent or unreadable.
    pub fn read_attendance(&self, identity: &str, event_key: &str) -> AttendanceStatus {
        self.load(identity)
            .attendance
            .get(event_key)
            .copied()
            .unwrap_or(AttendanceStatus::SawNone)
    }

    pub fn read_all_priorities(&self, identity: &str) -> BTreeMap<String, PriorityRank> {
        self.load(identity).priorities.clone()
    }

    pub fn read_all_attendance(&self, identity: &str) -> BTreeMap<String, AttendanceStatus> {
        self.load(identity).attendance.clone()
    }

    /// Returns whether any files exist for `identity`.
    pub fn has_namespace(&self, identity: &str) -> bool {
        self.namespace_dir(identity)
            .map(|dir| dir.is_dir())
            .unwrap_or(false)
    }

    /// Removes the whole namespace for `identity`. Missing is not an error.
    pub fn delete_all(&self, identity: &str) -> DataFileResult<()> {
        let dir = self.namespace_dir(identity)?;
        let removed = fs::remove_dir_all(&dir);
        self.invalidate(identity);
        match removed {
            Ok(()) => {
                info!(
                    "event=profile_files_delete module=files status=ok identity={}",
                    identity
                );
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(DataFileError::Io { path: dir, source }),
        }
    }

    fn load(&self, identity: &str) -> Arc<ProfileData> {
        let generation = {
            let cache = self.cache_guard();
            if let Some(cached) = cache.entries.get(identity) {
                return Arc::clone(cached);
            }
            cache.generation(identity)
        };

        let data = match self.namespace_dir(identity) {
            Ok(dir) => Arc::new(ProfileData {
                priorities: read_priorities_file(&dir.join(PRIORITIES_FILE)),
                attendance: read_attendance_file(&dir.join(ATTENDANCE_FILE)),
            }),
            Err(_) => return Arc::new(ProfileData::default()),
        };

        self.store_if_current(identity, generation, Arc::clone(&data));
        data
    }

    /// Caches `data` unless `identity` was invalidated since `generation`.
    fn store_if_current(&self, identity: &str, generation: u64, data: Arc<ProfileData>) {
        let mut cache = self.cache_guard();
        if cache.generation(identity) == generation {
            cache.entries.insert(identity.to_string(), data);
        }
    }

    fn invalidate(&self, identity: &str) {
        let mut cache = self.cache_guard();
        cache.entries.remove(identity);
        let next = cache.generation(identity).wrapping_add(1);
        cache.generations.insert(identity.to_string(), next);
    }

    fn cache_guard(&self) -> MutexGuard<'_, ReadCache> {
        // The cache only holds derived data; a poisoned map is still usable.
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn encode_priorities(priorities: &BTreeMap<String, PriorityRank>) -> DataFileResult<String> {
    let mut body = String::new();
    for (band, rank) in priorities {
        if !is_storable_band(band) {
            warn!(
                "event=profile_files_write module=files status=error kind=priorities reason=invalid_band"
            );
            return Err(DataFileError::InvalidBand(band.clone()));
        }
        body.push_str(band);
        body.push(ENTRY_SEPARATOR);
        body.push_str(&rank.to_code().to_string());
        body.push('\n');
    }
    Ok(body)
}

fn encode_attendance(
    path: &Path,
    attendance: &BTreeMap<String, AttendanceStatus>,
) -> DataFileResult<Vec<u8>> {
    let encoded: BTreeMap<&str, WireCode> = attendance
        .iter()
        .map(|(key, status)| (key.as_str(), status.to_code()))
        .collect();
    serde_json::to_vec_pretty(&encoded).map_err(|source| DataFileError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn read_priorities_file(path: &Path) -> BTreeMap<String, PriorityRank> {
    let body = match fs::read_to_string(path) {
        Ok(body) => body,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(
                    "event=profile_files_read module=files status=error kind=priorities error={}",
                    err
                );
            }
            return BTreeMap::new();
        }
    };

    let mut priorities = BTreeMap::new();
    let mut skipped = 0usize;
    for line in body.lines().filter(|line| !line.trim().is_empty()) {
        match parse_priority_line(line) {
            Some((band, rank)) => {
                priorities.insert(band, rank);
            }
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(
            "event=profile_files_read module=files status=partial kind=priorities skipped={}",
            skipped
        );
    }
    priorities
}

fn parse_priority_line(line: &str) -> Option<(String, PriorityRank)> {
    let (band, code) = line.rsplit_once(ENTRY_SEPARATOR)?;
    if band.is_empty() {
        return None;
    }
    let rank = PriorityRank::from_code(code.trim().parse::<WireCode>().ok()?)?;
    Some((band.to_string(), rank))
}

fn read_attendance_file(path: &Path) -> BTreeMap<String, AttendanceStatus> {
    let body = match fs::read(path) {
        Ok(body) => body,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(
                    "event=profile_files_read module=files status=error kind=attendance error={}",
                    err
                );
            }
            return BTreeMap::new();
        }
    };

    match serde_json::from_slice::<BTreeMap<String, WireCode>>(&body) {
        Ok(encoded) => encoded
            .into_iter()
            .map(|(key, code)| (key, AttendanceStatus::from_code_or_saw_none(code)))
            .collect(),
        Err(err) => {
            warn!(
                "event=profile_files_read module=files status=error kind=attendance error={}",
                err
            );
            BTreeMap::new()
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> DataFileError {
    let path = path.to_path_buf();
    move |source| DataFileError::Io { path, source }
}

fn read_raw(path: &Path) -> DataFileResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(body) => Ok(Some(body)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(DataFileError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn restore_file(path: &Path, body: Option<&[u8]>) -> DataFileResult<()> {
    match body {
        Some(body) => write_atomically(path, body),
        None => match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(DataFileError::Io {
                path: path.to_path_buf(),
                source,
            }),
        },
    }
}

fn write_atomically(path: &Path, body: &[u8]) -> DataFileResult<()> {
    let staged = stage(path, body)?;
    promote(&staged, path)
}

/// Writes `body` to the temp sibling of `path` and returns the temp path.
fn stage(path: &Path, body: &[u8]) -> DataFileResult<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(TEMP_SUFFIX);
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, body).map_err(io_error(&temp_path))?;
    Ok(temp_path)
}

fn promote(staged: &Path, path: &Path) -> DataFileResult<()> {
    if let Err(source) = fs::rename(staged, path) {
        discard_staged(staged);
        return Err(DataFileError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn discard_staged(staged: &Path) {
    let _ = fs::remove_file(staged);
}

/// Percent-encodes an identity into a directory name that cannot escape the
/// profiles root.
fn encode_namespace(identity: &str) -> String {
    let mut encoded = String::with_capacity(identity.len());
    for byte in identity.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose profile picker, share import/export and active-source calls to
//!   Dart via FRB.
//! - Flatten core errors into message strings for the UI.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - One process-wide `CoreRuntime` backs every call; it is opened lazily
//!   from `FESTPICK_*` environment configuration.

use festpick_core::share::{ImportDecision, ImportError};
use festpick_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    AttendanceStatus, CoreConfig, CoreRuntime, MemoryDefaultRecords, PriorityRank,
    ProfileMetadata,
};
use log::warn;
use once_cell::sync::{Lazy, OnceCell};
use std::collections::BTreeMap;
use std::sync::Arc;

static DEFAULT_RECORDS: Lazy<Arc<MemoryDefaultRecords>> =
    Lazy::new(|| Arc::new(MemoryDefaultRecords::new()));
static RUNTIME: OnceCell<CoreRuntime> = OnceCell::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// One row of the profile picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileItem {
    pub identity: String,
    pub label: String,
    pub color: String,
    pub import_date_ms: i64,
    pub share_date_ms: i64,
    pub event_year: i32,
    pub priority_count: u32,
    pub attendance_count: u32,
    pub is_read_only: bool,
    /// Whether this profile is the active source.
    pub is_active: bool,
}

/// Profile list envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilesListResponse {
    pub ok: bool,
    /// Default first, then by label.
    pub items: Vec<ProfileItem>,
    pub message: String,
}

/// Single-profile envelope returned by rename/recolor/import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileResponse {
    pub ok: bool,
    pub profile: Option<ProfileItem>,
    pub message: String,
}

impl ProfileResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            profile: None,
            message: message.into(),
        }
    }
}

/// Generic action envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Export envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareExportResponse {
    pub ok: bool,
    /// Written share file path.
    pub path: Option<String>,
    pub priority_count: u32,
    pub attendance_count: u32,
    pub message: String,
}

/// Pre-import confirmation data for one share file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareInspectResponse {
    pub ok: bool,
    pub identity: Option<String>,
    /// `true` shows the read-only update confirmation.
    pub is_update: bool,
    /// Existing label for updates, suggested label for new profiles.
    pub label: String,
    /// Existing color for updates.
    pub color: Option<String>,
    pub priority_count: u32,
    pub attendance_count: u32,
    pub message: String,
}

impl ShareInspectResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            identity: None,
            is_update: false,
            label: String::new(),
            color: None,
            priority_count: 0,
            attendance_count: 0,
            message: message.into(),
        }
    }
}

/// Import envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareImportResponse {
    pub ok: bool,
    pub profile: Option<ProfileItem>,
    pub was_update: bool,
    /// Attendance entries dropped because their keys were malformed.
    pub rejected_attendance_keys: u32,
    pub message: String,
}

/// Lists every profile for the picker.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn profiles_list() -> ProfilesListResponse {
    let listed = runtime().and_then(|runtime| {
        let active = runtime.controller().active_source();
        runtime
            .profiles()
            .list_profiles()
            .map(|rows| {
                rows.into_iter()
                    .map(|row| to_profile_item(row, &active))
                    .collect::<Vec<_>>()
            })
            .map_err(|err| err.to_string())
    });
    match listed {
        Ok(items) => ProfilesListResponse {
            ok: true,
            message: format!("{} profile(s).", items.len()),
            items,
        },
        Err(err) => ProfilesListResponse {
            ok: false,
            items: Vec::new(),
            message: format!("profiles_list failed: {err}"),
        },
    }
}

/// Renames one profile.
#[flutter_rust_bridge::frb(sync)]
pub fn profile_rename(identity: String, label: String) -> ProfileResponse {
    let renamed = runtime().and_then(|runtime| {
        let active = runtime.controller().active_source();
        runtime
            .profiles()
            .rename_profile(identity.trim(), &label)
            .map(|row| to_profile_item(row, &active))
            .map_err(|err| err.to_string())
    });
    match renamed {
        Ok(item) => ProfileResponse {
            ok: true,
            profile: Some(item),
            message: "Profile renamed.".to_string(),
        },
        Err(err) => ProfileResponse::failure(format!("profile_rename failed: {err}")),
    }
}

/// Changes one profile's color token.
#[flutter_rust_bridge::frb(sync)]
pub fn profile_recolor(identity: String, color: String) -> ProfileResponse {
    let recolored = runtime().and_then(|runtime| {
        let active = runtime.controller().active_source();
        runtime
            .profiles()
            .recolor_profile(identity.trim(), &color)
            .map(|row| to_profile_item(row, &active))
            .map_err(|err| err.to_string())
    });
    match recolored {
        Ok(item) => ProfileResponse {
            ok: true,
            profile: Some(item),
            message: "Profile recolored.".to_string(),
        },
        Err(err) => ProfileResponse::failure(format!("profile_recolor failed: {err}")),
    }
}

/// Deletes an imported profile. `"Default"` is always refused.
#[flutter_rust_bridge::frb(sync)]
pub fn profile_delete(identity: String) -> ActionResponse {
    match runtime().and_then(|runtime| {
        runtime
            .profiles()
            .delete_profile(identity.trim())
            .map_err(|err| err.to_string())
    }) {
        Ok(()) => ActionResponse::success("Profile deleted."),
        Err(err) => ActionResponse::failure(format!("profile_delete failed: {err}")),
    }
}

/// Exports the Default profile's records under `share_name`.
///
/// # FFI contract
/// - Writes one file into the configured export directory.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn share_export(share_name: String) -> ShareExportResponse {
    match runtime().and_then(|runtime| {
        runtime
            .exporter()
            .export(&share_name)
            .map_err(|err| err.to_string())
    }) {
        Ok(outcome) => ShareExportResponse {
            ok: true,
            path: Some(outcome.path.display().to_string()),
            priority_count: to_u32(outcome.priority_count),
            attendance_count: to_u32(outcome.attendance_count),
            message: "Share file exported.".to_string(),
        },
        Err(err) => ShareExportResponse {
            ok: false,
            path: None,
            priority_count: 0,
            attendance_count: 0,
            message: format!("share_export failed: {err}"),
        },
    }
}

/// Validates a share file and reports which confirmation to show.
///
/// No state is changed.
#[flutter_rust_bridge::frb(sync)]
pub fn share_inspect(path: String) -> ShareInspectResponse {
    let decided = runtime().and_then(|runtime| {
        let importer = runtime.importer();
        importer
            .validate_and_parse(path.trim())
            .and_then(|envelope| importer.decide(&envelope))
            .map_err(|err| import_message(&err))
    });
    match decided {
        Ok(ImportDecision::Update {
            identity,
            existing_label,
            existing_color,
            priority_count,
            attendance_count,
        }) => ShareInspectResponse {
            ok: true,
            identity: Some(identity),
            is_update: true,
            label: existing_label,
            color: Some(existing_color),
            priority_count: to_u32(priority_count),
            attendance_count: to_u32(attendance_count),
            message: "Profile exists; import will update it.".to_string(),
        },
        Ok(ImportDecision::New {
            identity,
            suggested_label,
            priority_count,
            attendance_count,
        }) => ShareInspectResponse {
            ok: true,
            identity: Some(identity),
            is_update: false,
            label: suggested_label,
            color: None,
            priority_count: to_u32(priority_count),
            attendance_count: to_u32(attendance_count),
            message: "New profile.".to_string(),
        },
        Err(err) => ShareInspectResponse::failure(format!("share_inspect failed: {err}")),
    }
}

/// Imports a share file and switches to the imported profile.
///
/// Input semantics:
/// - `label`: chosen label for new profiles; ignored for updates.
/// - `is_update`: the `is_update` value returned by `share_inspect`.
#[flutter_rust_bridge::frb(sync)]
pub fn share_import(path: String, label: String, is_update: bool) -> ShareImportResponse {
    let imported = runtime().and_then(|runtime| {
        runtime
            .import_and_activate(path.trim(), &label, is_update)
            .map(|outcome| (outcome, runtime.controller().active_source()))
            .map_err(|err| import_message(&err))
    });
    match imported {
        Ok((outcome, active)) => {
            let rejected = to_u32(outcome.rejected_attendance_keys.len());
            ShareImportResponse {
                ok: true,
                profile: Some(to_profile_item(outcome.metadata, &active)),
                was_update: outcome.was_update,
                rejected_attendance_keys: rejected,
                message: if outcome.was_update {
                    "Profile updated.".to_string()
                } else {
                    "Profile imported.".to_string()
                },
            }
        }
        Err(err) => ShareImportResponse {
            ok: false,
            profile: None,
            was_update: false,
            rejected_attendance_keys: 0,
            message: format!("share_import failed: {err}"),
        },
    }
}

/// Returns the active source identity, `"Default"` when unavailable.
#[flutter_rust_bridge::frb(sync)]
pub fn source_get() -> String {
    match runtime() {
        Ok(runtime) => runtime.controller().active_source(),
        Err(err) => {
            warn!(
                "event=ffi_source_get module=ffi status=error error={}",
                err
            );
            festpick_core::DEFAULT_PROFILE_ID.to_string()
        }
    }
}

/// Switches the active source and opens the quiet window.
#[flutter_rust_bridge::frb(sync)]
pub fn source_set(identity: String) -> ActionResponse {
    match runtime().and_then(|runtime| {
        runtime
            .controller()
            .set_active_source(identity.trim())
            .map_err(|err| err.to_string())
    }) {
        Ok(()) => ActionResponse::success("Source switched."),
        Err(err) => ActionResponse::failure(format!("source_set failed: {err}")),
    }
}

/// Returns whether background writers must currently skip their pass.
///
/// Fails safe to `true` when the runtime cannot be opened.
#[flutter_rust_bridge::frb(sync)]
pub fn source_write_suppressed() -> bool {
    runtime().map_or(true, |runtime| runtime.controller().is_write_suppressed())
}

/// Rank name (`unknown|must|might|wont`) for `band` in the active source.
#[flutter_rust_bridge::frb(sync)]
pub fn priority_get(band: String) -> String {
    runtime()
        .map_or(PriorityRank::Unknown, |runtime| {
            runtime.controller().priority(&band)
        })
        .as_str()
        .to_string()
}

/// Status name (`unset|saw_some|saw_all|saw_none`) for `event_key` in the
/// active source.
#[flutter_rust_bridge::frb(sync)]
pub fn attendance_get(event_key: String) -> String {
    runtime()
        .map_or(AttendanceStatus::SawNone, |runtime| {
            runtime.controller().attendance(&event_key)
        })
        .as_str()
        .to_string()
}

/// Records a rank in the active source. `unknown` clears the entry.
#[flutter_rust_bridge::frb(sync)]
pub fn priority_set(band: String, rank: String) -> ActionResponse {
    let Some(rank) = PriorityRank::parse(&rank) else {
        return ActionResponse::failure(format!("priority_set failed: unknown rank `{rank}`"));
    };
    match runtime().and_then(|runtime| {
        runtime
            .controller()
            .set_priority(&band, rank)
            .map_err(|err| err.to_string())
    }) {
        Ok(()) => ActionResponse::success("Priority saved."),
        Err(err) => ActionResponse::failure(format!("priority_set failed: {err}")),
    }
}

/// Records an attendance status in the active source. `unset` clears it.
#[flutter_rust_bridge::frb(sync)]
pub fn attendance_set(event_key: String, status: String) -> ActionResponse {
    let Some(status) = AttendanceStatus::parse(&status) else {
        return ActionResponse::failure(format!(
            "attendance_set failed: unknown status `{status}`"
        ));
    };
    match runtime().and_then(|runtime| {
        runtime
            .controller()
            .set_attendance(&event_key, status)
            .map_err(|err| err.to_string())
    }) {
        Ok(()) => ActionResponse::success("Attendance saved."),
        Err(err) => ActionResponse::failure(format!("attendance_set failed: {err}")),
    }
}

/// Replaces the Default profile's records held by the bridge.
///
/// Input semantics:
/// - `priorities_json`: JSON object band -> rank name.
/// - `attendance_json`: JSON object event key -> status name.
///
/// # FFI contract
/// - Either both maps are replaced or neither is.
#[flutter_rust_bridge::frb(sync)]
pub fn default_records_replace(priorities_json: String, attendance_json: String) -> ActionResponse {
    let priorities = match serde_json::from_str::<BTreeMap<String, PriorityRank>>(&priorities_json)
    {
        Ok(priorities) => priorities,
        Err(err) => {
            return ActionResponse::failure(format!(
                "default_records_replace failed: invalid priorities: {err}"
            ))
        }
    };
    let attendance =
        match serde_json::from_str::<BTreeMap<String, AttendanceStatus>>(&attendance_json) {
            Ok(attendance) => attendance,
            Err(err) => {
                return ActionResponse::failure(format!(
                    "default_records_replace failed: invalid attendance: {err}"
                ))
            }
        };

    let message = format!(
        "Replaced {} priorities and {} attendance entries.",
        priorities.len(),
        attendance.len()
    );
    DEFAULT_RECORDS.replace_all(priorities, attendance);
    ActionResponse::success(message)
}

fn runtime() -> Result<&'static CoreRuntime, String> {
    RUNTIME.get_or_try_init(|| {
        let config = CoreConfig::from_env().map_err(|err| format!("config error: {err}"))?;
        CoreRuntime::open(config, DEFAULT_RECORDS.clone())
            .map_err(|err| format!("core runtime open failed: {err}"))
    })
}

fn import_message(err: &ImportError) -> String {
    match err {
        ImportError::Decode(inner) => format!("invalid share file: {inner}"),
        other => other.to_string(),
    }
}

fn to_profile_item(row: ProfileMetadata, active: &str) -> ProfileItem {
    ProfileItem {
        is_active: row.identity == active,
        identity: row.identity,
        label: row.label,
        color: row.color,
        import_date_ms: row.import_date,
        share_date_ms: row.share_date,
        event_year: row.event_year,
        priority_count: row.priority_count,
        attendance_count: row.attendance_count,
        is_read_only: row.is_read_only,
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::{
        attendance_get, core_version, default_records_replace, init_logging, ping, priority_get,
        priority_set, profile_delete, profile_rename, profiles_list, share_export, share_import,
        share_inspect, source_get, source_set, source_write_suppressed,
    };
    use std::sync::{Mutex, MutexGuard, Once};

    static ENV_INIT: Once = Once::new();
    // Tests share one process-wide runtime; serialize the ones that mutate it.
    static SERIAL: Mutex<()> = Mutex::new(());

    fn setup() -> MutexGuard<'static, ()> {
        ENV_INIT.call_once(|| {
            let dir = tempfile::tempdir().expect("temp dir").into_path();
            std::env::set_var("FESTPICK_DATA_DIR", &dir);
            std::env::set_var("FESTPICK_QUIET_PERIOD_MS", "0");
        });
        SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn profiles_list_always_contains_default() {
        let _guard = setup();
        let response = profiles_list();
        assert!(response.ok, "{}", response.message);
        assert_eq!(response.items[0].identity, "Default");
    }

    #[test]
    fn default_profile_delete_is_refused() {
        let _guard = setup();
        let response = profile_delete("Default".to_string());
        assert!(!response.ok);
    }

    #[test]
    fn default_records_replace_rejects_bad_json() {
        let _guard = setup();
        let response = default_records_replace("[]".to_string(), "{}".to_string());
        assert!(!response.ok);
        assert!(response.message.contains("priorities"));
    }

    #[test]
    fn invalid_share_file_is_reported_without_changes() {
        let _guard = setup();
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("broken.festshare");
        std::fs::write(&path, b"{\"shareDate\":1,\"eventYear\":2025}").expect("write share");

        let inspected = share_inspect(path.display().to_string());
        assert!(!inspected.ok);
        assert!(inspected.message.contains("invalid share file"));

        let imported = share_import(path.display().to_string(), "X".to_string(), false);
        assert!(!imported.ok);
    }

    #[test]
    fn foreign_share_import_switches_source_and_routes_reads() {
        let _guard = setup();
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("friend.festshare");
        let body = serde_json::json!({
            "senderUserId": "ffi-friend-device",
            "senderName": "Friend",
            "shareDate": 1,
            "eventYear": 2025,
            "priorities": {"Metallica": 1},
            "attendance": {"Metallica:Main Stage:20:30:Show:2025": 2}
        });
        std::fs::write(&path, body.to_string()).expect("write share");

        let inspected = share_inspect(path.display().to_string());
        assert!(inspected.ok, "{}", inspected.message);
        assert_eq!(inspected.identity.as_deref(), Some("ffi-friend-device"));

        let imported = share_import(
            path.display().to_string(),
            "Friend".to_string(),
            inspected.is_update,
        );
        assert!(imported.ok, "{}", imported.message);
        assert_eq!(source_get(), "ffi-friend-device");
        assert_eq!(priority_get("Metallica".to_string()), "must");
        assert_eq!(
            attendance_get("Metallica:Main Stage:20:30:Show:2025".to_string()),
            "saw_all"
        );
        assert!(!source_write_suppressed());

        let renamed = profile_rename("ffi-friend-device".to_string(), "Pal".to_string());
        assert!(renamed.ok, "{}", renamed.message);
        assert_eq!(renamed.profile.map(|p| p.label).as_deref(), Some("Pal"));

        assert!(source_set("Default".to_string()).ok);
        assert!(profile_delete("ffi-friend-device".to_string()).ok);
        assert_eq!(source_get(), "Default");
    }

    #[test]
    fn default_records_feed_export() {
        let _guard = setup();
        assert!(source_set("Default".to_string()).ok);
        let replaced = default_records_replace(
            r#"{"Metallica":"must","Slayer":"wont"}"#.to_string(),
            r#"{"Metallica:Main Stage:20:30:Show:2025":"saw_some","Slayer:Pool Deck:18:00:Show:2025":"unset"}"#
                .to_string(),
        )
        .ok;
        assert!(replaced);
        assert_eq!(priority_get("Slayer".to_string()), "wont");

        let unknown = priority_set("Slayer".to_string(), "sometimes".to_string());
        assert!(!unknown.ok);

        let exported = share_export("My Picks".to_string());
        assert!(exported.ok, "{}", exported.message);
        assert_eq!(exported.priority_count, 2);
        assert_eq!(exported.attendance_count, 2);
        assert!(exported
            .path
            .as_deref()
            .is_some_and(|path| path.ends_with("My_Picks.festshare")));

        // Own export cannot be imported back.
        let inspected = share_inspect(exported.path.unwrap_or_default());
        assert!(!inspected.ok);
    }
}

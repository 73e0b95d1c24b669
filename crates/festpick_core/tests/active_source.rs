use festpick_core::config::CoreConfig;
use festpick_core::db::{self, open_db, open_db_in_memory};
use festpick_core::model::profile::{ProfileMetadata, DEFAULT_PROFILE_ID};
use festpick_core::model::ranking::{AttendanceStatus, PriorityRank};
use festpick_core::repo::profile_repo::{ProfileRepository, SqliteProfileRepository};
use festpick_core::runtime::CoreRuntime;
use festpick_core::share::PaletteColorAllocator;
use festpick_core::source::{
    DefaultRecords, ManualClock, MemoryDefaultRecords, SourceError, SourceListener, WriteDenied,
};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SHOW_KEY: &str = "Metallica:Main Stage:20:30:Show:2025";

struct Harness {
    runtime: CoreRuntime,
    clock: Arc<ManualClock>,
    default_records: Arc<MemoryDefaultRecords>,
}

fn harness_with(base: &Path, conn: Connection) -> Harness {
    let clock = Arc::new(ManualClock::new());
    let default_records = Arc::new(MemoryDefaultRecords::with_records(
        BTreeMap::from([("Metallica".to_string(), PriorityRank::Wont)]),
        BTreeMap::new(),
    ));
    let mut config = CoreConfig::with_base_dir(base);
    config.quiet_period = Duration::from_secs(5);
    let runtime = CoreRuntime::open_with(
        config,
        conn,
        default_records.clone(),
        Arc::new(PaletteColorAllocator),
        clock.clone(),
    )
    .unwrap();
    Harness {
        runtime,
        clock,
        default_records,
    }
}

fn harness(base: &Path) -> Harness {
    harness_with(base, open_db_in_memory().unwrap())
}

fn seed_profile(runtime: &CoreRuntime, identity: &str, rank: PriorityRank) {
    let files = runtime.files();
    files
        .write_priorities(
            identity,
            &BTreeMap::from([("Metallica".to_string(), rank)]),
        )
        .unwrap();
    files
        .write_attendance(
            identity,
            &BTreeMap::from([(SHOW_KEY.to_string(), AttendanceStatus::SawSome)]),
        )
        .unwrap();
    let conn = runtime.connection();
    let guard = db::lock(&conn).unwrap();
    SqliteProfileRepository::try_new(&guard)
        .unwrap()
        .upsert_profile(&ProfileMetadata {
            identity: identity.to_string(),
            label: identity.to_uppercase(),
            color: "#64B5F6".to_string(),
            import_date: 1,
            share_date: 1,
            event_year: 2025,
            priority_count: 1,
            attendance_count: 1,
            is_read_only: false,
        })
        .unwrap();
}

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl SourceListener for RecordingListener {
    fn on_source_changed(&self, identity: &str) {
        self.events.lock().unwrap().push(format!("changed:{identity}"));
    }

    fn on_refresh(&self) {
        self.events.lock().unwrap().push("refresh".to_string());
    }
}

#[test]
fn starts_on_default_and_reads_default_records() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    let controller = h.runtime.controller();

    assert_eq!(controller.active_source(), DEFAULT_PROFILE_ID);
    assert_eq!(controller.priority("Metallica"), PriorityRank::Wont);
    assert_eq!(controller.attendance(SHOW_KEY), AttendanceStatus::SawNone);
    assert!(!controller.is_write_suppressed());
}

#[test]
fn switch_opens_quiet_window_that_expires() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    seed_profile(&h.runtime, "device-123", PriorityRank::Must);
    let controller = h.runtime.controller();

    controller.set_active_source("device-123").unwrap();
    assert!(controller.is_write_suppressed());
    assert!(matches!(
        controller.begin_remote_write("device-123"),
        Err(WriteDenied::Suppressed { .. })
    ));

    h.clock.advance(Duration::from_millis(4_999));
    assert!(controller.is_write_suppressed());

    h.clock.advance(Duration::from_millis(1));
    assert!(!controller.is_write_suppressed());
    assert!(controller.begin_remote_write("device-123").is_ok());
}

#[test]
fn reads_follow_the_active_source() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    seed_profile(&h.runtime, "device-123", PriorityRank::Must);
    let controller = h.runtime.controller();

    controller.set_active_source("device-123").unwrap();
    assert_eq!(controller.priority("Metallica"), PriorityRank::Must);
    assert_eq!(controller.attendance(SHOW_KEY), AttendanceStatus::SawSome);
    assert_eq!(controller.priority("Slayer"), PriorityRank::Unknown);

    controller.set_active_source(DEFAULT_PROFILE_ID).unwrap();
    assert_eq!(controller.priority("Metallica"), PriorityRank::Wont);
}

#[test]
fn edits_route_to_the_active_source_only() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    seed_profile(&h.runtime, "device-123", PriorityRank::Must);
    let controller = h.runtime.controller();

    controller.set_active_source("device-123").unwrap();
    controller
        .set_priority("Slayer", PriorityRank::Might)
        .unwrap();
    controller
        .set_attendance(SHOW_KEY, AttendanceStatus::Unset)
        .unwrap();

    assert_eq!(h.default_records.priority("Slayer"), PriorityRank::Unknown);
    let stored = h.runtime.profiles().profile("device-123").unwrap();
    assert_eq!((stored.priority_count, stored.attendance_count), (2, 0));

    controller.set_active_source(DEFAULT_PROFILE_ID).unwrap();
    controller
        .set_priority("Slayer", PriorityRank::Must)
        .unwrap();
    assert_eq!(h.default_records.priority("Slayer"), PriorityRank::Must);
    assert_eq!(
        h.runtime.files().read_priority("device-123", "Slayer"),
        PriorityRank::Might
    );
}

#[test]
fn unknown_sources_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    let controller = h.runtime.controller();

    let err = controller.set_active_source("ghost").unwrap_err();

    assert!(matches!(err, SourceError::UnknownSource(identity) if identity == "ghost"));
    assert_eq!(controller.active_source(), DEFAULT_PROFILE_ID);
    assert!(!controller.is_write_suppressed());
}

#[test]
fn permits_go_stale_after_a_switch() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    seed_profile(&h.runtime, "device-123", PriorityRank::Must);
    let controller = h.runtime.controller();

    let permit = controller.begin_remote_write(DEFAULT_PROFILE_ID).unwrap();
    assert!(controller.permit_is_current(&permit));

    controller.set_active_source("device-123").unwrap();
    h.clock.advance(Duration::from_secs(10));

    assert!(!controller.permit_is_current(&permit));
    assert_eq!(
        controller.begin_remote_write(DEFAULT_PROFILE_ID),
        Err(WriteDenied::StaleSource {
            active: "device-123".to_string()
        })
    );
}

#[test]
fn listeners_hear_change_before_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    seed_profile(&h.runtime, "device-123", PriorityRank::Must);
    let controller = h.runtime.controller();
    let listener = Arc::new(RecordingListener::default());
    controller.add_listener(listener.clone());

    controller.set_active_source("device-123").unwrap();

    assert_eq!(
        *listener.events.lock().unwrap(),
        vec!["changed:device-123".to_string(), "refresh".to_string()]
    );
}

#[test]
fn read_only_lookup_fails_safe() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    seed_profile(&h.runtime, "device-123", PriorityRank::Must);
    let controller = h.runtime.controller();

    assert!(!controller.is_read_only(DEFAULT_PROFILE_ID));
    assert!(!controller.is_read_only("device-123"));
    assert!(controller.is_read_only("ghost"));
}

#[test]
fn available_sources_list_default_first() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    seed_profile(&h.runtime, "zed", PriorityRank::Must);
    seed_profile(&h.runtime, "amy", PriorityRank::Must);

    let sources = h.runtime.controller().available_sources().unwrap();

    assert_eq!(sources, vec!["Default", "amy", "zed"]);
}

#[test]
fn active_source_survives_restart_and_falls_back_when_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("festpick.sqlite3");
    {
        let h = harness_with(dir.path(), open_db(&db_path).unwrap());
        seed_profile(&h.runtime, "device-123", PriorityRank::Must);
        h.runtime
            .controller()
            .set_active_source("device-123")
            .unwrap();
    }

    {
        let h = harness_with(dir.path(), open_db(&db_path).unwrap());
        let controller = h.runtime.controller();
        assert_eq!(controller.active_source(), "device-123");
        assert!(!controller.is_write_suppressed());
    }

    let conn = open_db(&db_path).unwrap();
    conn.execute("DELETE FROM profiles WHERE identity = 'device-123';", [])
        .unwrap();
    let h = harness_with(dir.path(), conn);
    assert_eq!(h.runtime.controller().active_source(), DEFAULT_PROFILE_ID);
}

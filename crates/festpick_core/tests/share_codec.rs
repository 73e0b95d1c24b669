use festpick_core::config::CoreConfig;
use festpick_core::db::open_db_in_memory;
use festpick_core::model::ranking::{AttendanceStatus, PriorityRank};
use festpick_core::runtime::CoreRuntime;
use festpick_core::share::{
    parse_envelope, DecodeError, ExportError, ImportError, PaletteColorAllocator, ShareVariant,
};
use festpick_core::source::{DefaultRecords, ManualClock, MemoryDefaultRecords};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const SHOW_KEY: &str = "Metallica:Main Stage:20:30:Show:2025";
const CLINIC_KEY: &str = "Slayer:Pool Deck:Clinic:Special:2025";
const UNSET_KEY: &str = "Opening Act:Lounge:18:00:Show:2025";

fn runtime_at(
    base: &Path,
    variant: ShareVariant,
    records: Arc<MemoryDefaultRecords>,
) -> CoreRuntime {
    let mut config = CoreConfig::with_base_dir(base);
    config.variant = variant;
    config.event_year = 2025;
    CoreRuntime::open_with(
        config,
        open_db_in_memory().unwrap(),
        records,
        Arc::new(PaletteColorAllocator),
        Arc::new(ManualClock::new()),
    )
    .unwrap()
}

fn seeded_records() -> Arc<MemoryDefaultRecords> {
    Arc::new(MemoryDefaultRecords::with_records(
        BTreeMap::from([
            ("Metallica".to_string(), PriorityRank::Must),
            ("Slayer".to_string(), PriorityRank::Might),
            ("Nickelback".to_string(), PriorityRank::Wont),
            ("Opening Act".to_string(), PriorityRank::Unknown),
        ]),
        BTreeMap::from([
            (SHOW_KEY.to_string(), AttendanceStatus::SawAll),
            (CLINIC_KEY.to_string(), AttendanceStatus::SawSome),
            (UNSET_KEY.to_string(), AttendanceStatus::Unset),
        ]),
    ))
}

#[test]
fn export_writes_known_entries_with_fixed_codes() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime_at(dir.path(), ShareVariant::Festival, seeded_records());

    let outcome = runtime.exporter().export("Alice's Picks").unwrap();

    assert_eq!(outcome.path.extension().and_then(|e| e.to_str()), Some("festshare"));
    assert_eq!(outcome.path.parent(), Some(runtime.config().export_dir.as_path()));
    assert_eq!((outcome.priority_count, outcome.attendance_count), (3, 3));

    let raw: serde_json::Value = serde_json::from_slice(&fs::read(&outcome.path).unwrap()).unwrap();
    assert_eq!(raw["senderName"], "Alice's Picks");
    assert_eq!(raw["eventYear"], 2025);
    assert_eq!(raw["version"], "1.0");
    assert_eq!(raw["priorities"]["Metallica"], 1);
    assert_eq!(raw["priorities"]["Slayer"], 2);
    assert_eq!(raw["priorities"]["Nickelback"], 3);
    assert!(raw["priorities"].get("Opening Act").is_none());
    assert_eq!(raw["attendance"][SHOW_KEY], 2);
    assert_eq!(raw["attendance"][CLINIC_KEY], 1);
    assert_eq!(raw["attendance"][UNSET_KEY], 0);
    assert!(!raw["senderUserId"].as_str().unwrap().is_empty());
}

#[test]
fn export_reuses_the_install_identity() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime_at(dir.path(), ShareVariant::Festival, seeded_records());
    let exporter = runtime.exporter();

    let first = exporter.build_envelope("A").unwrap();
    let second = exporter.build_envelope("B").unwrap();

    assert_eq!(first.sender_user_id, second.sender_user_id);
}

#[test]
fn export_rejects_blank_share_name() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime_at(dir.path(), ShareVariant::Festival, seeded_records());

    assert!(matches!(
        runtime.exporter().export("   "),
        Err(ExportError::InvalidShareName)
    ));
}

#[test]
fn exported_records_arrive_intact_on_another_device() {
    let sender_dir = tempfile::tempdir().unwrap();
    let receiver_dir = tempfile::tempdir().unwrap();
    let sender_records = seeded_records();
    let sender = runtime_at(sender_dir.path(), ShareVariant::Cruise, sender_records.clone());
    let receiver = runtime_at(
        receiver_dir.path(),
        ShareVariant::Cruise,
        Arc::new(MemoryDefaultRecords::new()),
    );

    let exported = sender.exporter().export("Alice").unwrap();
    let outcome = receiver
        .import_and_activate(&exported.path, "Alice", false)
        .unwrap();

    let identity = outcome.metadata.identity.clone();
    let files = receiver.files();
    let expected_priorities: BTreeMap<String, PriorityRank> = sender_records
        .all_priorities()
        .into_iter()
        .filter(|(_, rank)| *rank != PriorityRank::Unknown)
        .collect();
    assert_eq!(files.read_all_priorities(&identity), expected_priorities);
    assert_eq!(files.read_attendance(&identity, SHOW_KEY), AttendanceStatus::SawAll);
    assert_eq!(files.read_attendance(&identity, CLINIC_KEY), AttendanceStatus::SawSome);
    assert_eq!(
        files.read_attendance(&identity, UNSET_KEY),
        sender_records.attendance(UNSET_KEY)
    );
    assert_eq!(receiver.controller().attendance(UNSET_KEY), AttendanceStatus::Unset);
    assert_eq!(receiver.controller().active_source(), identity);
    assert_eq!(receiver.controller().priority("Slayer"), PriorityRank::Might);
}

#[test]
fn other_variant_extension_is_rejected() {
    let sender_dir = tempfile::tempdir().unwrap();
    let receiver_dir = tempfile::tempdir().unwrap();
    let sender = runtime_at(sender_dir.path(), ShareVariant::Cruise, seeded_records());
    let receiver = runtime_at(
        receiver_dir.path(),
        ShareVariant::Festival,
        Arc::new(MemoryDefaultRecords::new()),
    );

    let exported = sender.exporter().export("Alice").unwrap();
    let err = receiver
        .importer()
        .validate_and_parse(&exported.path)
        .unwrap_err();

    assert!(matches!(
        err,
        ImportError::Decode(DecodeError::VariantMismatch {
            expected: ShareVariant::Festival,
            found: ShareVariant::Cruise,
        })
    ));
}

#[test]
fn renamed_files_are_still_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime_at(dir.path(), ShareVariant::Festival, seeded_records());
    let path = dir.path().join("download.json");
    fs::write(
        &path,
        br#"{"senderUserId":"device-9","shareDate":1,"eventYear":2025,"priorities":{"A":1}}"#,
    )
    .unwrap();

    let envelope = runtime.importer().validate_and_parse(&path).unwrap();
    assert_eq!(envelope.sender_user_id, "device-9");
}

#[test]
fn unrecognised_codes_fail_closed() {
    let envelope = parse_envelope(
        br#"{
            "senderUserId": "device-1",
            "shareDate": 1,
            "eventYear": 2025,
            "priorities": {"Metallica": 42, "Slayer": -1},
            "attendance": {"Metallica:Main Stage:20:30:Show:2025": 9}
        }"#,
    )
    .unwrap();

    let priorities = envelope.decode_priorities();
    assert_eq!(priorities.get("Metallica"), Some(&PriorityRank::Unknown));
    assert_eq!(priorities.get("Slayer"), Some(&PriorityRank::Unknown));
    let attendance = envelope.decode_attendance();
    assert_eq!(attendance.entries.get(SHOW_KEY), Some(&AttendanceStatus::SawNone));
}

#[test]
fn malformed_attendance_keys_are_rejected_not_guessed() {
    let envelope = parse_envelope(
        br#"{
            "senderUserId": "device-1",
            "shareDate": 1,
            "eventYear": 2025,
            "attendance": {
                "Metallica:Main Stage:20:30:Show:2025": 2,
                "Metallica:Main Stage:Show": 2,
                "A:B:C:D:E:F:G": 1,
                "Band:Stage:Show:Kind:soon": 1
            }
        }"#,
    )
    .unwrap();

    let attendance = envelope.decode_attendance();
    assert_eq!(attendance.entries.len(), 1);
    assert_eq!(attendance.rejected_keys.len(), 3);
}

#[test]
fn malformed_documents_are_rejected() {
    let bodies: [&[u8]; 4] = [
        b"not json",
        br#"{"shareDate":1,"eventYear":2025}"#,
        br#"{"senderUserId":"d1","eventYear":2025}"#,
        br#"{"senderUserId":"d1","shareDate":1,"eventYear":2025,"version":"3.1"}"#,
    ];
    for body in bodies {
        assert!(parse_envelope(body).is_err());
    }
}

use festpick_core::config::CoreConfig;
use festpick_core::db::open_db_in_memory;
use festpick_core::model::profile::DEFAULT_PROFILE_ID;
use festpick_core::runtime::CoreRuntime;
use festpick_core::service::profile_service::ProfileServiceError;
use festpick_core::share::PaletteColorAllocator;
use festpick_core::source::{ManualClock, MemoryDefaultRecords};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn runtime(base: &Path) -> CoreRuntime {
    CoreRuntime::open_with(
        CoreConfig::with_base_dir(base),
        open_db_in_memory().unwrap(),
        Arc::new(MemoryDefaultRecords::new()),
        Arc::new(PaletteColorAllocator),
        Arc::new(ManualClock::new()),
    )
    .unwrap()
}

fn import(runtime: &CoreRuntime, dir: &Path, identity: &str, name: &str) {
    let path = dir.join(format!("{identity}.festshare"));
    fs::write(
        &path,
        format!(
            r#"{{"senderUserId":"{identity}","senderName":"{name}","shareDate":1,"eventYear":2025,"priorities":{{"Metallica":1}}}}"#
        ),
    )
    .unwrap();
    runtime.import_and_activate(&path, name, false).unwrap();
}

#[test]
fn rename_and_recolor_update_the_picker_row() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime(dir.path());
    import(&runtime, dir.path(), "device-1", "Alice");
    let service = runtime.profiles();

    let renamed = service.rename_profile("device-1", " Ally ").unwrap();
    assert_eq!(renamed.label, "Ally");
    let recolored = service.recolor_profile("device-1", "#BA68C8").unwrap();
    assert_eq!(recolored.color, "#BA68C8");
    assert_eq!(recolored.label, "Ally");

    assert!(matches!(
        service.rename_profile("device-1", "  "),
        Err(ProfileServiceError::InvalidLabel)
    ));
    assert!(matches!(
        service.recolor_profile("device-1", ""),
        Err(ProfileServiceError::InvalidColor)
    ));
    assert!(matches!(
        service.rename_profile("ghost", "Ghost"),
        Err(ProfileServiceError::ProfileNotFound(identity)) if identity == "ghost"
    ));
}

#[test]
fn default_profile_cannot_be_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime(dir.path());

    let err = runtime.profiles().delete_profile(DEFAULT_PROFILE_ID).unwrap_err();

    assert!(matches!(err, ProfileServiceError::DefaultProfileUndeletable));
    assert_eq!(runtime.profiles().list_profiles().unwrap().len(), 1);
}

#[test]
fn deleting_active_profile_removes_everything_and_resets_source() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime(dir.path());
    import(&runtime, dir.path(), "device-1", "Alice");
    import(&runtime, dir.path(), "device-2", "Bob");
    runtime.controller().set_active_source("device-1").unwrap();
    let service = runtime.profiles();

    service.delete_profile("device-1").unwrap();

    assert_eq!(runtime.controller().active_source(), DEFAULT_PROFILE_ID);
    assert!(!runtime.files().has_namespace("device-1"));
    assert!(runtime.files().has_namespace("device-2"));
    let identities: Vec<String> = service
        .list_profiles()
        .unwrap()
        .into_iter()
        .map(|row| row.identity)
        .collect();
    assert_eq!(identities, vec!["Default", "device-2"]);
    assert!(matches!(
        service.delete_profile("device-1"),
        Err(ProfileServiceError::ProfileNotFound(_))
    ));
}

#[test]
fn deleting_inactive_profile_keeps_active_source() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime(dir.path());
    import(&runtime, dir.path(), "device-1", "Alice");
    import(&runtime, dir.path(), "device-2", "Bob");

    runtime.profiles().delete_profile("device-1").unwrap();

    assert_eq!(runtime.controller().active_source(), "device-2");
}

#[test]
fn summary_reports_active_state_and_files() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime(dir.path());
    import(&runtime, dir.path(), "device-1", "Alice");
    let service = runtime.profiles();

    let summary = service.profile_summary("device-1").unwrap();
    assert!(summary.is_active);
    assert!(summary.has_data_files);
    assert_eq!(summary.metadata.priority_count, 1);

    let default = service.profile_summary(DEFAULT_PROFILE_ID).unwrap();
    assert!(!default.is_active);
    assert!(!default.has_data_files);
}

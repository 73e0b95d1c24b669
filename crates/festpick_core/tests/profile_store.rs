use festpick_core::db::open_db_in_memory;
use festpick_core::model::profile::{
    ProfileMetadata, DEFAULT_PROFILE_COLOR, DEFAULT_PROFILE_ID, DEFAULT_PROFILE_LABEL,
};
use festpick_core::repo::profile_repo::{
    ProfileRepoError, ProfileRepository, SqliteProfileRepository,
};

fn imported(identity: &str, label: &str, color: &str) -> ProfileMetadata {
    ProfileMetadata {
        identity: identity.to_string(),
        label: label.to_string(),
        color: color.to_string(),
        import_date: 1_700_000_000_000,
        share_date: 1_699_999_000_000,
        event_year: 2025,
        priority_count: 3,
        attendance_count: 2,
        is_read_only: false,
    }
}

#[test]
fn fresh_store_lists_only_default() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteProfileRepository::try_new(&conn).unwrap();

    let profiles = repo.list_profiles().unwrap();

    assert_eq!(profiles.len(), 1);
    let default = &profiles[0];
    assert_eq!(default.identity, DEFAULT_PROFILE_ID);
    assert_eq!(default.label, DEFAULT_PROFILE_LABEL);
    assert_eq!(default.color, DEFAULT_PROFILE_COLOR);
    assert_eq!(default.priority_count, 0);
    assert_eq!(default.attendance_count, 0);
    assert!(!default.is_read_only);
}

#[test]
fn default_is_created_on_first_get_and_never_deleted() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteProfileRepository::try_new(&conn).unwrap();

    let first = repo.get_profile(DEFAULT_PROFILE_ID).unwrap().unwrap();
    let second = repo.get_profile(DEFAULT_PROFILE_ID).unwrap().unwrap();
    assert_eq!(first, second);

    assert!(!repo.delete_profile(DEFAULT_PROFILE_ID).unwrap());
    assert!(repo.get_profile(DEFAULT_PROFILE_ID).unwrap().is_some());
}

#[test]
fn default_survives_dropped_table() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("DROP TABLE profiles;").unwrap();

    let repo = SqliteProfileRepository::try_new(&conn).unwrap();
    let default = repo.get_profile(DEFAULT_PROFILE_ID).unwrap();

    assert_eq!(default.map(|row| row.identity).as_deref(), Some("Default"));
}

#[test]
fn upsert_replaces_fields_but_keeps_first_color() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteProfileRepository::try_new(&conn).unwrap();

    repo.upsert_profile(&imported("device-1", "Alice", "#E57373"))
        .unwrap();
    let mut second = imported("device-1", "Alice (phone)", "#000000");
    second.priority_count = 9;
    repo.upsert_profile(&second).unwrap();

    let stored = repo.get_profile("device-1").unwrap().unwrap();
    assert_eq!(stored.label, "Alice (phone)");
    assert_eq!(stored.priority_count, 9);
    assert_eq!(stored.color, "#E57373");
    assert_eq!(repo.list_profiles().unwrap().len(), 2);
}

#[test]
fn list_orders_default_first_then_label_case_insensitive() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteProfileRepository::try_new(&conn).unwrap();

    repo.upsert_profile(&imported("d3", "charlie", "#1")).unwrap();
    repo.upsert_profile(&imported("d1", "Bob", "#2")).unwrap();
    repo.upsert_profile(&imported("d2", "alice", "#3")).unwrap();
    repo.upsert_profile(&imported("d0", "Bob", "#4")).unwrap();

    let order: Vec<String> = repo
        .list_profiles()
        .unwrap()
        .into_iter()
        .map(|row| row.identity)
        .collect();
    assert_eq!(order, vec!["Default", "d2", "d0", "d1", "d3"]);
}

#[test]
fn delete_removes_only_existing_rows() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteProfileRepository::try_new(&conn).unwrap();
    repo.upsert_profile(&imported("device-1", "Alice", "#1"))
        .unwrap();

    assert!(repo.delete_profile("device-1").unwrap());
    assert!(!repo.delete_profile("device-1").unwrap());
    assert!(repo.get_profile("device-1").unwrap().is_none());
}

#[test]
fn targeted_updates_validate_and_report_missing_rows() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteProfileRepository::try_new(&conn).unwrap();
    repo.upsert_profile(&imported("device-1", "Alice", "#1"))
        .unwrap();

    repo.update_label("device-1", "  Ally  ").unwrap();
    repo.update_color("device-1", "#64B5F6").unwrap();
    repo.update_counts("device-1", 7, 4).unwrap();
    let stored = repo.get_profile("device-1").unwrap().unwrap();
    assert_eq!(stored.label, "Ally");
    assert_eq!(stored.color, "#64B5F6");
    assert_eq!((stored.priority_count, stored.attendance_count), (7, 4));

    assert!(matches!(
        repo.update_label("device-1", "   "),
        Err(ProfileRepoError::Validation(_))
    ));
    assert!(matches!(
        repo.update_label("ghost", "Ghost"),
        Err(ProfileRepoError::NotFound(identity)) if identity == "ghost"
    ));
}

#[test]
fn default_can_be_renamed_on_fresh_store() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteProfileRepository::try_new(&conn).unwrap();

    repo.update_label(DEFAULT_PROFILE_ID, "Me").unwrap();

    let default = repo.get_profile(DEFAULT_PROFILE_ID).unwrap().unwrap();
    assert_eq!(default.label, "Me");
}

#[test]
fn upsert_rejects_blank_identity() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteProfileRepository::try_new(&conn).unwrap();

    let err = repo
        .upsert_profile(&imported("  ", "Nobody", "#1"))
        .unwrap_err();
    assert!(matches!(err, ProfileRepoError::Validation(_)));
}

#[test]
fn labels_are_stored_trimmed_on_upsert_and_rename() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteProfileRepository::try_new(&conn).unwrap();

    repo.upsert_profile(&imported("device-1", "  Alice \n", "#FF0000"))
        .unwrap();
    assert_eq!(repo.get_profile("device-1").unwrap().unwrap().label, "Alice");

    repo.update_label("device-1", "  Al  ").unwrap();
    assert_eq!(repo.get_profile("device-1").unwrap().unwrap().label, "Al");
}

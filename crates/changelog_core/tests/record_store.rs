mod support;

use changelog_core::{
    ChangeError, ChangeManager, ChangeRequest, ChangeStatus, ChangelogConfig, Enrollment,
    EnrollmentError, RecordStore, RepoError,
};
use support::{
    count_rows, enrolled_store, setup_registry, stored_widget_change_id, Gadget, PlainNote, Widget,
};

fn request() -> ChangeRequest {
    ChangeRequest::new().interface("tests")
}

#[test]
fn enforced_write_outside_change_is_rejected_before_sql() {
    let db = setup_registry();
    let store = enrolled_store(db.default_connection());
    let manager = ChangeManager::new(&db);

    let mut widget = Widget::new("loose");
    let err = store.save(&manager, &mut widget).unwrap_err();
    assert!(matches!(err, ChangeError::WriteOutsideSession { table: "widgets" }));
    assert!(err.to_string().contains("begin a change first"));

    assert_eq!(widget.id, None);
    assert_eq!(widget.change_id, None);
    assert_eq!(count_rows(db.default_connection(), "widgets"), 0);
}

#[test]
fn rejected_record_can_be_saved_once_a_change_opens() {
    let db = setup_registry();
    let store = enrolled_store(db.default_connection());
    let mut manager = ChangeManager::new(&db);

    let mut widget = Widget::new("patient");
    assert!(store.save(&manager, &mut widget).is_err());

    let change_id = manager.begin(&request(), false).unwrap();
    assert!(store.save(&manager, &mut widget).unwrap());
    manager.commit().unwrap();

    assert_eq!(widget.change_id, Some(change_id));
    assert_eq!(
        stored_widget_change_id(db.default_connection(), widget.id.unwrap()),
        Some(change_id)
    );
}

#[test]
fn clean_records_are_skipped_even_when_enforced() {
    let db = setup_registry();
    let store = enrolled_store(db.default_connection());
    let mut manager = ChangeManager::new(&db);

    let change_id = manager.begin(&request(), false).unwrap();
    let mut widget = Widget::new("settled");
    assert!(store.save(&manager, &mut widget).unwrap());
    manager.commit().unwrap();

    assert!(!store.save(&manager, &mut widget).unwrap());
    assert_eq!(widget.change_id, Some(change_id));
}

#[test]
fn optional_enrollment_writes_without_a_change() {
    let db = setup_registry();
    let store = enrolled_store(db.default_connection());
    let mut manager = ChangeManager::new(&db);

    let mut loose = Gadget::new("loose");
    assert!(store.save(&manager, &mut loose).unwrap());
    assert_eq!(loose.revision_id, None);
    assert!(store.owning_change(&loose).unwrap().is_none());

    let change_id = manager.begin(&request(), false).unwrap();
    let mut tracked = Gadget::new("tracked");
    store.save(&manager, &mut tracked).unwrap();
    manager.commit().unwrap();

    assert_eq!(tracked.revision_id, Some(change_id));
    let owner = store.owning_change(&tracked).unwrap().unwrap();
    assert_eq!(owner.id, change_id);
    assert_eq!(owner.status, ChangeStatus::Complete);
    assert_eq!(count_rows(db.default_connection(), "gadgets"), 2);
}

#[test]
fn owning_change_reflects_the_latest_stamp() {
    let db = setup_registry();
    let store = enrolled_store(db.default_connection());
    let mut manager = ChangeManager::new(&db);

    let mut widget = Widget::new("versioned");
    assert!(store.owning_change(&widget).unwrap().is_none());

    manager.begin(&request(), false).unwrap();
    store.save(&manager, &mut widget).unwrap();
    manager.commit().unwrap();

    let failed = manager.begin(&request(), false).unwrap();
    widget.rename("versioned again");
    store.save(&manager, &mut widget).unwrap();
    manager.roll_back().unwrap();

    let owner = store.owning_change(&widget).unwrap().unwrap();
    assert_eq!(owner.id, failed);
    assert_eq!(owner.status, ChangeStatus::Failed);
}

#[test]
fn unenrolled_types_bypass_tracking() {
    let db = setup_registry();
    let store = enrolled_store(db.default_connection());
    let manager = ChangeManager::new(&db);

    assert!(!store.is_enrolled::<PlainNote>());
    let mut note = PlainNote::new("free form");
    assert!(store.save(&manager, &mut note).unwrap());
    assert!(note.id.is_some());

    let err = store.owning_change(&note).unwrap_err();
    assert!(matches!(err, ChangeError::NotEnrolled("plain_notes")));
}

#[test]
fn enroll_checks_knobs_and_table_shape() {
    let db = setup_registry();
    let mut store = RecordStore::new(db.default_connection());

    let err = store
        .enroll_with::<Widget>(Enrollment::default().with_column("revision id"))
        .unwrap_err();
    assert!(matches!(
        err,
        ChangeError::InvalidEnrollment {
            table: "widgets",
            reason: EnrollmentError::InvalidColumn(_)
        }
    ));

    let err = store
        .enroll_with::<Widget>(Enrollment::default().with_column("revision_id"))
        .unwrap_err();
    assert!(matches!(
        err,
        ChangeError::Repo(RepoError::MissingRequiredColumn { table: "widgets", ref column })
            if column == "revision_id"
    ));

    let err = store.enroll::<PlainNote>().unwrap_err();
    assert!(matches!(
        err,
        ChangeError::Repo(RepoError::MissingRequiredColumn { table: "plain_notes", .. })
    ));
    assert!(!store.is_enrolled::<Widget>());
    assert!(!store.is_enrolled::<PlainNote>());
}

#[test]
fn type_knobs_override_store_defaults() {
    let db = setup_registry();
    let config = ChangelogConfig {
        defaults: Enrollment::optional(),
        ..ChangelogConfig::default()
    };
    let mut store = RecordStore::from_config(db.default_connection(), &config);
    store.enroll::<Widget>().unwrap();
    store.enroll::<Gadget>().unwrap();

    let widgets = store.enrollment_for("widgets").unwrap();
    assert!(!widgets.force_changelogging);
    assert_eq!(widgets.change_id_column, "change_id");
    let gadgets = store.enrollment_for("gadgets").unwrap();
    assert_eq!(gadgets.change_id_column, "revision_id");

    let manager = ChangeManager::new(&db);
    let mut widget = Widget::new("relaxed");
    assert!(store.save(&manager, &mut widget).unwrap());
    assert_eq!(
        stored_widget_change_id(db.default_connection(), widget.id.unwrap()),
        None
    );
}

#[test]
fn failed_write_restores_previous_stamp() {
    let db = setup_registry();
    let store = enrolled_store(db.default_connection());
    let mut manager = ChangeManager::new(&db);

    let mut ghost = Widget::new("ghost");
    ghost.id = Some(999);
    manager.begin(&request(), false).unwrap();
    let err = store.save(&manager, &mut ghost).unwrap_err();
    manager.roll_back().unwrap();

    assert!(matches!(
        err,
        ChangeError::Repo(RepoError::RowNotFound {
            table: "widgets",
            row_id: 999
        })
    ));
    assert_eq!(ghost.change_id, None);
}

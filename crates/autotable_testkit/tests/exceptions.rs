//! Persisted exception log.

use autotable_core::{ExceptionLog, Severity, EXCEPTIONS_TABLE};
use autotable_testkit::{Member, TestDatabase};

#[test]
fn handler_failures_are_persisted_once_per_kind() {
    let t = TestDatabase::memory();
    let log = ExceptionLog::install(&t.db);
    let members = t.db.handler::<Member>().unwrap();
    members.add(Member::new("a@example.com", "A")).unwrap();

    for _ in 0..3 {
        assert!(members.add(Member::new("a@example.com", "B")).is_err());
    }
    let entries = log.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].handler_name, "Member");
    assert!(entries[0].message.starts_with("Add failed"));
    assert_eq!(entries[0].hash.len(), 64);

    members.add(Member::new("b@example.com", "B")).unwrap();
    assert!(members.add(Member::new("b@example.com", "C")).is_err());
    assert_eq!(log.entries().unwrap().len(), 2);
    assert_eq!(t.backend.row_count(EXCEPTIONS_TABLE), Some(2));
}

#[test]
fn warnings_are_not_persisted() {
    let t = TestDatabase::memory();
    let log = ExceptionLog::install(&t.db);
    t.db.event_sink()
        .record("Somewhere", "only a warning", Severity::Warning);
    assert!(log.entries().unwrap().is_empty());
}

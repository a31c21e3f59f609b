//! Table creation, restructuring and unique index bookkeeping.

use autotable_core::{
    Config, CoreError, Database, Query, Record, SchemaBuilder, Severity, UNIQUE_KEYS_TABLE,
};
use autotable_storage::{InMemoryBackend, Statement};
use autotable_testkit::{Member, TestDatabase, TestRecord};
use std::sync::Arc;

/// [`Member`] after the unique flag was removed from `Email`.
#[derive(Debug, Clone, Default)]
struct PlainMember {
    id: i32,
    email: String,
    name: String,
}

impl Record for PlainMember {
    fn entity_name() -> &'static str {
        "Member"
    }
    fn id(&self) -> i32 {
        self.id
    }
    fn set_id(&mut self, id: i32) {
        self.id = id;
    }
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema
            .string("Email", |m| m.email.clone(), |m, v| m.email = v)
            .size(120);
        schema.string("Name", |m| m.name.clone(), |m, v| m.name = v);
    }
}

#[derive(Debug, Clone, Default)]
struct DoubleKeyed {
    id: i32,
    code: i32,
}

impl Record for DoubleKeyed {
    fn entity_name() -> &'static str {
        "DoubleKeyed"
    }
    fn id(&self) -> i32 {
        self.id
    }
    fn set_id(&mut self, id: i32) {
        self.id = id;
    }
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.int("Code", |d| d.code, |d, v| d.code = v).key();
    }
}

fn unique_changes(statements: &[Statement]) -> usize {
    statements
        .iter()
        .filter(|s| matches!(s, Statement::AddUniqueIndex { .. } | Statement::DropIndex { .. }))
        .count()
}

#[test]
fn unique_index_is_created_once() {
    let t = TestDatabase::memory();
    let members = t.db.handler::<Member>().unwrap();
    members.add(Member::new("a@example.com", "A")).unwrap();

    assert!(t
        .backend
        .indexes("Member")
        .unwrap()
        .contains(&"Email_UNIQUE".to_string()));
    assert_eq!(t.backend.row_count(UNIQUE_KEYS_TABLE), Some(1));

    t.backend.reset_log();
    members.restructure().unwrap();
    members.restructure().unwrap();
    assert_eq!(unique_changes(&t.backend.statements()), 0);
    assert_eq!(t.backend.row_count(UNIQUE_KEYS_TABLE), Some(1));
}

#[test]
fn dropped_unique_flag_drops_the_index() {
    let t = TestDatabase::memory();
    t.db
        .handler::<Member>()
        .unwrap()
        .add(Member::new("a@example.com", "A"))
        .unwrap();

    let plain = t.db.handler::<PlainMember>().unwrap();
    plain.restructure().unwrap();
    assert!(!t
        .backend
        .indexes("Member")
        .unwrap()
        .contains(&"Email_UNIQUE".to_string()));
    assert_eq!(t.backend.row_count(UNIQUE_KEYS_TABLE), Some(0));

    plain
        .add(PlainMember {
            email: "a@example.com".into(),
            name: "again".into(),
            ..PlainMember::default()
        })
        .unwrap();
    assert_eq!(plain.count_items(Query::all()).unwrap(), 2);
}

#[test]
fn second_key_field_is_fatal() {
    let t = TestDatabase::memory();
    let handler = t.db.handler::<DoubleKeyed>().unwrap();
    let err = handler.add(DoubleKeyed::default()).unwrap_err();

    assert!(matches!(err, CoreError::PrimaryKeyConflict { .. }));
    assert!(!t.backend.has_table("DoubleKeyed"));
    let critical = t.events.at_least(Severity::Critical);
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].sender, "DoubleKeyed");
}

#[test]
fn force_restructure_runs_once_per_table() {
    let backend = Arc::new(InMemoryBackend::new());
    let first = Database::with_backend(Config::default(), backend.clone()).unwrap();
    first
        .handler::<TestRecord>()
        .unwrap()
        .add(TestRecord::new(1, "one"))
        .unwrap();

    let forced =
        Database::with_backend(Config::new().force_restructure(true), backend.clone()).unwrap();
    let handler = forced.handler::<TestRecord>().unwrap();
    backend.reset_log();

    assert_eq!(handler.get_all().unwrap().len(), 1);
    let restructures = |log: &[Statement]| {
        log.iter()
            .filter(|s| matches!(s, Statement::AddPrimaryKey { .. }))
            .count()
    };
    assert_eq!(restructures(&backend.statements()), 1);

    handler.add(TestRecord::new(2, "two")).unwrap();
    handler.get_all().unwrap();
    assert_eq!(restructures(&backend.statements()), 1);
}

#[test]
fn concurrent_first_use_creates_one_table() {
    let t = TestDatabase::memory();
    let handler = t.tests();
    let threads: Vec<_> = (0..8)
        .map(|i| {
            let handler = handler.clone();
            std::thread::spawn(move || handler.add(TestRecord::new(i, "racing")).unwrap())
        })
        .collect();
    let mut ids: Vec<i32> = threads.into_iter().map(|h| h.join().unwrap().id).collect();
    ids.sort_unstable();

    assert_eq!(ids, (1..=8).collect::<Vec<_>>());
    assert_eq!(t.backend.row_count("Test"), Some(8));
    assert_eq!(t.stats().errors(), 0);
}

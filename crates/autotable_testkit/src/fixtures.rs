//! Test fixtures and database helpers.
//!
//! Provides record types shared by the integration tests and a database
//! wired to an instrumented in-memory backend.

use autotable_core::{
    Config, Database, Handler, HandlerOptions, MemorySink, OrdinalEnum, Record, SchemaBuilder,
};
use autotable_storage::InMemoryBackend;
use chrono::NaiveDateTime;
use std::sync::{Arc, Once};

/// The canonical test record: table `Test` with `IntValue` and a
/// 100-character `StringValue`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestRecord {
    /// Row id.
    pub id: i32,
    /// Integer payload.
    pub int_value: i32,
    /// Text payload.
    pub string_value: String,
}

impl TestRecord {
    /// Creates an unsaved record.
    pub fn new(int_value: i32, string_value: impl Into<String>) -> Self {
        Self {
            id: 0,
            int_value,
            string_value: string_value.into(),
        }
    }
}

impl Record for TestRecord {
    fn entity_name() -> &'static str {
        "Test"
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.int("IntValue", |r| r.int_value, |r, v| r.int_value = v);
        schema
            .string("StringValue", |r| r.string_value.clone(), |r, v| r.string_value = v)
            .size(100);
    }
}

/// [`TestRecord`] after a new field was added to the type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestRecordV2 {
    /// Row id.
    pub id: i32,
    /// Integer payload.
    pub int_value: i32,
    /// Text payload.
    pub string_value: String,
    /// The added field.
    pub new_value: i32,
}

impl Record for TestRecordV2 {
    fn entity_name() -> &'static str {
        "Test"
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.int("IntValue", |r| r.int_value, |r, v| r.int_value = v);
        schema
            .string("StringValue", |r| r.string_value.clone(), |r, v| r.string_value = v)
            .size(100);
        schema.int("NewValue", |r| r.new_value, |r, v| r.new_value = v);
    }
}

/// A record with a unique column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Member {
    /// Row id.
    pub id: i32,
    /// Unique address.
    pub email: String,
    /// Display name.
    pub name: String,
}

impl Member {
    /// Creates an unsaved member.
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            email: email.into(),
            name: name.into(),
        }
    }
}

impl Record for Member {
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
            .size(120)
            .unique();
        schema.string("Name", |m| m.name.clone(), |m, v| m.name = v);
    }
}

/// Priority of a [`Task`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Priority {
    /// Whenever.
    #[default]
    Low,
    /// Soon.
    Normal,
    /// Now.
    High,
}

impl OrdinalEnum for Priority {
    fn ordinal(&self) -> i32 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
        }
    }

    fn from_ordinal(ordinal: i32) -> Option<Self> {
        match ordinal {
            0 => Some(Self::Low),
            1 => Some(Self::Normal),
            2 => Some(Self::High),
            _ => None,
        }
    }
}

/// A record using every semantic type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Task {
    /// Row id.
    pub id: i32,
    /// Title.
    pub title: String,
    /// Done flag.
    pub done: bool,
    /// Due date.
    pub due: NaiveDateTime,
    /// Estimated hours.
    pub estimate: f64,
    /// Priority.
    pub priority: Priority,
    /// Never stored.
    pub scratch: String,
}

impl Record for Task {
    fn entity_name() -> &'static str {
        "Task"
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.string("Title", |t| t.title.clone(), |t, v| t.title = v);
        schema.bool("Done", |t| t.done, |t, v| t.done = v);
        schema.timestamp("Due", |t| t.due, |t, v| t.due = v);
        schema.float("Estimate", |t| t.estimate, |t, v| t.estimate = v);
        schema.enumeration("Priority", |t| t.priority, |t, v| t.priority = v);
        schema
            .string("Scratch", |t| t.scratch.clone(), |t, v| t.scratch = v)
            .ignore();
    }
}

/// A test database with its backend and event sink exposed.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The backend behind `db`, for counting and fault injection.
    pub backend: Arc<InMemoryBackend>,
    /// Every event the engine reported.
    pub events: Arc<MemorySink>,
}

impl TestDatabase {
    /// Creates a database with the default configuration.
    pub fn memory() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a database with `config`.
    pub fn with_config(config: Config) -> Self {
        init_tracing();
        let backend = Arc::new(InMemoryBackend::new());
        let db = Database::with_backend(config, backend.clone())
            .expect("Failed to open in-memory database");
        let events = Arc::new(MemorySink::new());
        db.set_event_sink(events.clone());
        Self {
            db,
            backend,
            events,
        }
    }

    /// Returns the handler for [`TestRecord`].
    pub fn tests(&self) -> Handler<TestRecord> {
        self.db.handler().expect("Failed to create handler")
    }

    /// Returns a handler for `T` with `options`.
    pub fn handler_with<T: Record>(&self, options: HandlerOptions<T>) -> Handler<T> {
        self.db
            .handler_with(options)
            .expect("Failed to create handler")
    }

    /// Adds `count` test records with values `1..=count`.
    pub fn seed(&self, count: i32) -> Vec<TestRecord> {
        let handler = self.tests();
        (1..=count)
            .map(|i| {
                handler
                    .add(TestRecord::new(i, format!("value {i}")))
                    .expect("Failed to seed record")
            })
            .collect()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Installs a `tracing` subscriber once per process.
///
/// Honours `RUST_LOG`; output goes through the test harness capture.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Runs a test with a fresh [`TestDatabase`].
///
/// # Example
///
/// ```rust
/// use autotable_testkit::{with_test_db, TestRecord};
///
/// with_test_db(|t| {
///     let stored = t.tests().add(TestRecord::new(1, "one")).unwrap();
///     assert_eq!(stored.id, 1);
/// });
/// ```
pub fn with_test_db<F, R>(f: F) -> R
where
    F: FnOnce(&TestDatabase) -> R,
{
    let t = TestDatabase::memory();
    f(&t)
}

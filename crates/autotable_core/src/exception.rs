//! Persisted exception log.
//!
//! [`ExceptionLog`] is an [`EventSink`] that keeps every error-level event in
//! a table of its own, next to the application's data. Events with the same
//! sender and message share a hash; a repeat replaces the older row, so the
//! table holds one row per distinct failure with the time it last happened.

use crate::database::{Database, DatabaseInner};
use crate::error::CoreResult;
use crate::handler::{Handler, HandlerOptions};
use crate::log::{EventSink, Severity, TracingSink};
use crate::query::{OrderBy, Query};
use crate::record::Record;
use crate::schema::SchemaBuilder;
use chrono::{NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use std::cell::Cell;
use std::fmt::Write as _;
use std::sync::{Arc, Weak};

/// Table holding [`ExceptionRecord`] rows.
pub const EXCEPTIONS_TABLE: &str = "autotable_Exceptions";

const MESSAGE_SIZE: u32 = 250;

thread_local! {
    /// Set while this thread is writing an exception row.
    static PERSISTING: Cell<bool> = const { Cell::new(false) };
}

/// One persisted failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExceptionRecord {
    /// Row id.
    pub id: i32,
    /// Who reported the failure.
    pub handler_name: String,
    /// What failed.
    pub message: String,
    /// When it last happened.
    pub timestamp: NaiveDateTime,
    /// SHA-256 of sender and message, hex encoded.
    pub hash: String,
}

impl Record for ExceptionRecord {
    fn entity_name() -> &'static str {
        "Exception"
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema
            .string("HandlerName", |e| e.handler_name.clone(), |e, v| e.handler_name = v)
            .size(125);
        schema
            .string("Message", |e| e.message.clone(), |e, v| e.message = v)
            .size(MESSAGE_SIZE);
        schema.timestamp("TimeStamp", |e| e.timestamp, |e, v| e.timestamp = v);
        schema
            .string("ExceptionHash", |e| e.hash.clone(), |e, v| e.hash = v)
            .size(350);
    }
}

/// Hex SHA-256 identifying a failure.
pub fn exception_hash(sender: &str, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sender.as_bytes());
    hasher.update([0x1f]);
    hasher.update(message.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// An event sink that stores failures in the database it reports on.
///
/// Every event is also forwarded to `tracing`. Only events at
/// [`Severity::Error`] or above are stored. Writing the row never reports
/// its own failures, so a broken database cannot make the sink recurse.
pub struct ExceptionLog {
    db: Weak<DatabaseInner>,
    fallback: TracingSink,
}

impl std::fmt::Debug for ExceptionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionLog")
            .field("attached", &(self.db.strong_count() > 0))
            .finish()
    }
}

impl ExceptionLog {
    /// Creates the log and installs it as `db`'s event sink.
    pub fn install(db: &Database) -> Arc<Self> {
        let log = Arc::new(Self {
            db: db.downgrade(),
            fallback: TracingSink,
        });
        db.set_event_sink(log.clone());
        log
    }

    fn handler(&self) -> Option<Handler<ExceptionRecord>> {
        let db = Database::from_inner(self.db.upgrade()?);
        db.handler_with(
            HandlerOptions::new()
                .table_name(EXCEPTIONS_TABLE)
                .log_errors(false)
                .cache_enabled(false),
        )
        .ok()
    }

    /// Stored failures, newest first.
    pub fn entries(&self) -> CoreResult<Vec<ExceptionRecord>> {
        match self.handler() {
            Some(handler) => handler.get_items(Query::all().order_by(OrderBy::desc("ID"))),
            None => Ok(Vec::new()),
        }
    }

    /// Stored failures reported by `sender`.
    pub fn entries_for(&self, sender: &str) -> CoreResult<Vec<ExceptionRecord>> {
        match self.handler() {
            Some(handler) => handler.get_items(
                Query::by_field("HandlerName", sender).order_by(OrderBy::desc("ID")),
            ),
            None => Ok(Vec::new()),
        }
    }

    /// Removes every stored failure.
    pub fn clear(&self) -> CoreResult<u64> {
        let Some(handler) = self.handler() else {
            return Ok(0);
        };
        let all = handler.get_all()?;
        handler.delete_records(&all)
    }

    fn persist(&self, sender: &str, message: &str) -> CoreResult<()> {
        let Some(handler) = self.handler() else {
            return Ok(());
        };
        let message: String = message
            .replace('<', "[")
            .replace('>', "]")
            .chars()
            .take(MESSAGE_SIZE as usize)
            .collect();
        let hash = exception_hash(sender, &message);
        let previous = handler.get_items(Query::by_field("ExceptionHash", hash.as_str()))?;
        handler.delete_records(&previous)?;
        handler.add(ExceptionRecord {
            id: 0,
            handler_name: sender.to_string(),
            message,
            timestamp: Utc::now().naive_utc(),
            hash,
        })?;
        Ok(())
    }
}

impl EventSink for ExceptionLog {
    fn record(&self, sender: &str, message: &str, severity: Severity) {
        self.fallback.record(sender, message, severity);
        if severity < Severity::Error || PERSISTING.with(Cell::get) {
            return;
        }
        PERSISTING.with(|p| p.set(true));
        let result = self.persist(sender, message);
        PERSISTING.with(|p| p.set(false));
        if let Err(err) = result {
            tracing::warn!(%err, "could not persist exception");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_hex() {
        let a = exception_hash("Test", "boom");
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, exception_hash("Test", "boom"));
        assert_ne!(a, exception_hash("Tes", "tboom"));
    }

    #[test]
    fn errors_are_stored_once_per_hash() {
        let db = Database::open_in_memory().unwrap();
        let log = ExceptionLog::install(&db);
        let sink = db.event_sink();
        sink.record("Orders", "insert <failed>", Severity::Error);
        sink.record("Orders", "insert <failed>", Severity::Error);
        sink.record("Orders", "just saying", Severity::Info);
        sink.record("Users", "gone", Severity::Critical);

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].handler_name, "Users");
        let orders = log.entries_for("Orders").unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].message, "insert [failed]");
        assert_eq!(log.clear().unwrap(), 2);
        assert!(log.entries().unwrap().is_empty());
    }

    #[test]
    fn detached_log_is_silent() {
        let db = Database::open_in_memory().unwrap();
        let log = ExceptionLog::install(&db);
        drop(db);
        log.record("X", "after close", Severity::Failure);
        assert!(log.entries().unwrap().is_empty());
    }
}

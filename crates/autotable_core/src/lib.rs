//! # AutoTable Core
//!
//! Typed persistence engine for AutoTable.
//!
//! This crate provides:
//! - Record type descriptions built once per type
//! - Tables created and repaired on demand when the schema drifts
//! - Unique indexes kept in step with the record types
//! - A read cache invalidated by every write to the same table
//! - Bounded connection admission with retry of transient failures
//! - An optional exception log persisted next to the data
//!
//! ## Example
//!
//! ```rust
//! use autotable_core::{Database, Query, OrderBy, Record, SchemaBuilder};
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Note {
//!     id: i32,
//!     title: String,
//! }
//!
//! impl Record for Note {
//!     fn entity_name() -> &'static str {
//!         "Note"
//!     }
//!     fn id(&self) -> i32 {
//!         self.id
//!     }
//!     fn set_id(&mut self, id: i32) {
//!         self.id = id;
//!     }
//!     fn describe(schema: &mut SchemaBuilder<Self>) {
//!         schema.string("Title", |n| n.title.clone(), |n, v| n.title = v);
//!     }
//! }
//!
//! let db = Database::open_in_memory().unwrap();
//! let notes = db.handler::<Note>().unwrap();
//! let stored = notes
//!     .add(Note { id: 0, title: "first".into() })
//!     .unwrap();
//! assert_eq!(stored.id, 1);
//!
//! let latest = notes
//!     .get_items(Query::all().order_by(OrderBy::desc("ID")).limit(5))
//!     .unwrap();
//! assert_eq!(latest, vec![stored]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod admission;
mod cache;
mod config;
pub mod convert;
mod database;
mod error;
mod exception;
mod executor;
mod handler;
mod log;
mod mapper;
mod query;
mod record;
mod schema;
mod stats;
mod usage;

pub use admission::{AdmissionController, Exhausted, Ticket};
pub use cache::{
    CacheStore, CachedValue, MemoryCacheStore, QueryCache, DEFAULT_PURGE_THRESHOLD,
};
pub use config::{
    Config, ENV_CONNECTION_STRING, ENV_FORCE_RESTRUCTURE, ENV_LOG_QUERIES, ENV_MAX_CONNECTIONS,
};
pub use convert::CoercionError;
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use exception::{exception_hash, ExceptionLog, ExceptionRecord, EXCEPTIONS_TABLE};
pub use executor::Cursor;
pub use handler::{Handler, HandlerOptions};
pub use log::{Event, EventSink, MemorySink, Severity, TracingSink};
pub use query::{Filter, FilterKind, OrderBy, Query, Selection};
pub use record::{OrdinalEnum, Record};
pub use schema::{
    Field, FieldDescriptor, FieldOptions, Oversized, SchemaBuilder, SemanticType, TypeDescriptor,
    UniqueKey, DEFAULT_STRING_SIZE, ID_FIELD, INTERNAL_TABLE_PREFIX, UNIQUE_KEYS_TABLE,
};
pub use stats::{DatabaseStats, MeterReading, RequestMeter, StatsSnapshot, UsageCounter};
pub use usage::{DailyStats, DailyUsage, DAILY_STATS_TABLE, FLUSH_INTERVAL};

pub use autotable_storage::{
    BackendError, Direction, ErrorKind, InMemoryBackend, SqlBackend, Value,
};

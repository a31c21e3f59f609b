//! # AutoTable Storage
//!
//! SQL backend trait and implementations for AutoTable.
//!
//! This crate is the lowest layer of AutoTable. It knows how to execute a
//! typed [`Statement`] against a relational store and how to classify the
//! failures that come back. It knows nothing about record types, caching or
//! schema repair.
//!
//! ## Design Principles
//!
//! - Statements are data, not strings; rendering happens at the edge
//! - Every failure carries a tagged [`ErrorKind`]
//! - Backends must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - MySQL semantics emulated in memory
//! - [`MySqlBackend`] - A MySQL-compatible server (feature `mysql`)
//!
//! ## Example
//!
//! ```rust
//! use autotable_storage::{ColumnDef, ColumnType, InMemoryBackend, SqlBackend, Statement};
//!
//! let backend = InMemoryBackend::new();
//! backend
//!     .execute(&Statement::CreateTable {
//!         table: "Notes".into(),
//!         columns: vec![ColumnDef::new("Body", ColumnType::Varchar(250))],
//!         primary_key: None,
//!     })
//!     .unwrap();
//! assert!(backend.has_table("Notes"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
#[cfg(feature = "mysql")]
mod mysql_backend;
mod statement;
mod value;

pub use backend::{Outcome, ResultSet, Row, SqlBackend};
pub use error::{BackendError, BackendResult, ErrorKind};
pub use memory::InMemoryBackend;
#[cfg(feature = "mysql")]
pub use mysql_backend::{kind_for_code, MySqlBackend};
pub use statement::{
    escape_like, ColumnDef, ColumnType, Condition, Direction, Order, RenderedSql, Select,
    Statement,
};
pub use value::Value;

//! Error types for backend operations.

use std::fmt;
use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Classification of a failed statement.
///
/// Backends translate whatever their driver reports into one of these
/// kinds. Code above the backend only ever branches on the kind, never on
/// the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The table referenced by the statement does not exist.
    TableMissing,
    /// A referenced column does not exist (or is missing from a result set).
    ColumnMissing,
    /// `ADD COLUMN` for a column that already exists.
    DuplicateColumn,
    /// `ADD INDEX` with a name that is already taken.
    DuplicateKeyName,
    /// `DROP INDEX` for an index that does not exist.
    MissingIndex,
    /// A unique or primary key constraint was violated.
    DuplicateEntry,
    /// A second primary key was requested on a table.
    MultiplePrimaryKey,
    /// Connection-level failure that may succeed when retried.
    Transient,
    /// The backend cannot execute this statement shape.
    Unsupported,
    /// Anything else.
    Other,
}

impl ErrorKind {
    /// Returns true for table/column drift that a schema repair can fix.
    #[must_use]
    pub const fn is_schema_drift(self) -> bool {
        matches!(self, Self::TableMissing | Self::ColumnMissing)
    }

    /// Returns true if the statement may be retried as-is.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TableMissing => "table missing",
            Self::ColumnMissing => "column missing",
            Self::DuplicateColumn => "duplicate column",
            Self::DuplicateKeyName => "duplicate key name",
            Self::MissingIndex => "missing index",
            Self::DuplicateEntry => "duplicate entry",
            Self::MultiplePrimaryKey => "multiple primary key",
            Self::Transient => "transient",
            Self::Unsupported => "unsupported",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// A classified backend failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct BackendError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// The driver or server message, unchanged.
    pub message: String,
}

impl BackendError {
    /// Creates a new backend error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a table missing error.
    pub fn table_missing(table: &str) -> Self {
        Self::new(
            ErrorKind::TableMissing,
            format!("Table '{table}' doesn't exist"),
        )
    }

    /// Creates a column missing error.
    pub fn column_missing(column: &str, clause: &str) -> Self {
        Self::new(
            ErrorKind::ColumnMissing,
            format!("Unknown column '{column}' in '{clause}'"),
        )
    }

    /// Creates a duplicate entry error.
    pub fn duplicate_entry(value: &str, key: &str) -> Self {
        Self::new(
            ErrorKind::DuplicateEntry,
            format!("Duplicate entry '{value}' for key '{key}'"),
        )
    }

    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }
}

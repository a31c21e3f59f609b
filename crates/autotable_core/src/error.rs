//! Error types for AutoTable core.

use crate::convert::CoercionError;
use autotable_storage::{BackendError, ErrorKind};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in AutoTable core operations.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Backend error that the engine did not handle.
    #[error("backend error: {0}")]
    Backend(BackendError),

    /// A schema repair was attempted and did not fix the table.
    #[error("schema repair failed for {table}: {message}")]
    SchemaRepairFailed {
        /// Table that could not be repaired.
        table: String,
        /// Description of the failure.
        message: String,
    },

    /// A record type declares more than one key field.
    #[error("primary key conflict on {entity}: {message}")]
    PrimaryKeyConflict {
        /// Entity with the conflicting declaration.
        entity: String,
        /// Description of the conflict.
        message: String,
    },

    /// Transient failures persisted past the retry ceiling.
    #[error("could not connect after {attempts} attempts: {message}")]
    CouldNotConnect {
        /// Attempts made, including the first.
        attempts: u32,
        /// Last failure seen.
        message: String,
    },

    /// A unique or primary key constraint rejected the write.
    ///
    /// The message is the server's, unchanged.
    #[error("{message}")]
    DuplicateEntry {
        /// Server message.
        message: String,
    },

    /// The operation needs a record that has been stored already.
    #[error("record of {entity} has no id")]
    UnsavedRecord {
        /// Entity name.
        entity: String,
    },

    /// A query named a field the record type does not map.
    #[error("unknown field {field} on {entity}")]
    UnknownField {
        /// Entity name.
        entity: String,
        /// Requested field.
        field: String,
    },

    /// A field value has no column representation.
    #[error("invalid value for {entity}: {message}")]
    InvalidValue {
        /// Entity name.
        entity: String,
        /// Description of the value.
        message: String,
    },

    /// The record type description is unusable.
    #[error("invalid schema for {entity}: {message}")]
    InvalidSchema {
        /// Entity name.
        entity: String,
        /// Description of the problem.
        message: String,
    },

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a schema repair failed error.
    pub fn schema_repair_failed(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaRepairFailed {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a primary key conflict error.
    pub fn primary_key_conflict(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PrimaryKeyConflict {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates a could not connect error.
    pub fn could_not_connect(attempts: u32, message: impl Into<String>) -> Self {
        Self::CouldNotConnect {
            attempts,
            message: message.into(),
        }
    }

    /// Creates an unsaved record error.
    pub fn unsaved_record(entity: impl Into<String>) -> Self {
        Self::UnsavedRecord {
            entity: entity.into(),
        }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            entity: entity.into(),
            field: field.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(entity: impl Into<String>, err: &CoercionError) -> Self {
        Self::InvalidValue {
            entity: entity.into(),
            message: err.to_string(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns the backend classification, if this wraps a backend error.
    pub fn backend_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Backend(err) => Some(err.kind),
            _ => None,
        }
    }

    /// Returns true for errors that no retry or repair can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PrimaryKeyConflict { .. } | Self::CouldNotConnect { .. } | Self::Config { .. }
        )
    }
}

impl From<BackendError> for CoreError {
    fn from(err: BackendError) -> Self {
        match err.kind {
            ErrorKind::DuplicateEntry => Self::DuplicateEntry {
                message: err.message,
            },
            _ => Self::Backend(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_entry_keeps_server_message() {
        let err: CoreError = BackendError::duplicate_entry("bob", "Name_UNIQUE").into();
        assert!(matches!(err, CoreError::DuplicateEntry { .. }));
        assert_eq!(err.to_string(), "Duplicate entry 'bob' for key 'Name_UNIQUE'");
    }

    #[test]
    fn drift_stays_classified() {
        let err: CoreError = BackendError::table_missing("Test").into();
        assert_eq!(err.backend_kind(), Some(ErrorKind::TableMissing));
        assert!(!err.is_fatal());
    }

    #[test]
    fn fatal_errors() {
        assert!(CoreError::primary_key_conflict("Test", "two keys").is_fatal());
        assert!(CoreError::could_not_connect(8, "refused").is_fatal());
        assert!(!CoreError::unsaved_record("Test").is_fatal());
    }
}

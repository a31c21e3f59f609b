//! SQL backend trait definition.

use crate::error::BackendResult;
use crate::statement::Statement;
use crate::value::Value;

/// One row of a result set, in column order.
pub type Row = Vec<Value>;

/// A fully materialised result set.
///
/// Rows are consumed front to back. Column lookup ignores ASCII case, as
/// MySQL column names do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl ResultSet {
    /// Creates a result set from column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the position of a column, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consumes the set, yielding its rows.
    pub fn into_rows(self) -> std::vec::IntoIter<Row> {
        self.rows.into_iter()
    }
}

/// What a successful statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Rows from a `SELECT`.
    Rows(ResultSet),
    /// Effect of a write or DDL statement.
    Affected {
        /// Rows changed.
        rows: u64,
        /// Auto-increment value generated by the last insert, or 0.
        last_insert_id: u64,
    },
}

impl Outcome {
    /// Returns the affected row count (0 for result sets).
    pub fn affected_rows(&self) -> u64 {
        match self {
            Outcome::Affected { rows, .. } => *rows,
            Outcome::Rows(_) => 0,
        }
    }
}

/// A relational backend that executes [`Statement`]s.
///
/// # Invariants
///
/// - Every call opens (or borrows) its own physical connection and gives it
///   back before returning; admission control happens above this trait.
/// - Failures are classified into [`crate::ErrorKind`] here and nowhere else.
/// - Backends must be `Send + Sync`; any number of threads call `execute`.
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - MySQL semantics emulated in memory
/// - [`super::MySqlBackend`] - a real MySQL-compatible server
pub trait SqlBackend: Send + Sync {
    /// Executes one statement (or one batch) on a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns a classified [`crate::BackendError`] on any failure.
    fn execute(&self, statement: &Statement) -> BackendResult<Outcome>;

    /// Short name for log output.
    fn name(&self) -> &str {
        "sql"
    }
}

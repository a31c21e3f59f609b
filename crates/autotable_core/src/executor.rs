//! Statement execution with admission control and transient retries.

use crate::admission::{AdmissionController, Ticket};
use crate::error::{CoreError, CoreResult};
use crate::log::{Severity, SinkSlot};
use crate::stats::{DatabaseStats, UsageCounter};
use autotable_storage::{Outcome, ResultSet, Row, SqlBackend, Statement};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const SENDER: &str = "Executor";

/// Rows of one query, holding the admission ticket they were read under.
///
/// The ticket goes back to the pool when the cursor is dropped, whether the
/// rows were read to the end or not.
#[derive(Debug)]
pub struct Cursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Row>,
    _ticket: Option<Ticket>,
}

impl Cursor {
    fn new(set: ResultSet, ticket: Ticket) -> Self {
        Self {
            columns: set.columns().to_vec(),
            rows: set.into_rows(),
            _ticket: Some(ticket),
        }
    }

    /// A cursor over rows that need no ticket.
    pub fn detached(set: ResultSet) -> Self {
        Self {
            columns: set.columns().to_vec(),
            rows: set.into_rows(),
            _ticket: None,
        }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of a column, ignoring ASCII case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

impl Iterator for Cursor {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }
}

/// Runs statements against the backend.
///
/// Every attempt takes an admission ticket first. Transient failures (lost
/// connections, lock waits, an exhausted slot pool) are retried up to
/// `max_retries` times; anything else is returned to the caller at once so
/// schema drift can be repaired one level up.
pub(crate) struct Executor {
    backend: Arc<dyn SqlBackend>,
    admission: Arc<AdmissionController>,
    stats: Arc<DatabaseStats>,
    sink: Arc<SinkSlot>,
    acquire_timeout: Duration,
    max_retries: u32,
    log_queries: bool,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("backend", &self.backend.name())
            .field("capacity", &self.admission.capacity())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

pub(crate) struct ExecutorSettings {
    pub acquire_timeout: Duration,
    pub max_retries: u32,
    pub log_queries: bool,
}

impl Executor {
    pub(crate) fn new(
        backend: Arc<dyn SqlBackend>,
        admission: Arc<AdmissionController>,
        stats: Arc<DatabaseStats>,
        sink: Arc<SinkSlot>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            backend,
            admission,
            stats,
            sink,
            acquire_timeout: settings.acquire_timeout,
            max_retries: settings.max_retries,
            log_queries: settings.log_queries,
        }
    }

    pub(crate) fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Runs a write or DDL statement.
    pub(crate) fn execute(&self, statement: &Statement) -> CoreResult<Outcome> {
        self.run(statement).map(|(outcome, _ticket)| outcome)
    }

    /// Runs a read, handing back a cursor that keeps the ticket.
    pub(crate) fn query(&self, statement: &Statement) -> CoreResult<Cursor> {
        let (outcome, ticket) = self.run(statement)?;
        let set = match outcome {
            Outcome::Rows(set) => set,
            Outcome::Affected { .. } => ResultSet::default(),
        };
        Ok(Cursor::new(set, ticket))
    }

    fn run(&self, statement: &Statement) -> CoreResult<(Outcome, Ticket)> {
        let sql = statement.render().sql;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let failure = match self.admission.acquire(self.acquire_timeout) {
                Ok(ticket) => {
                    ticket.trace(&sql);
                    if self.log_queries {
                        debug!(backend = self.backend.name(), attempt, "{sql}");
                    }
                    self.stats.increment_request_count();
                    match self.backend.execute(statement) {
                        Ok(outcome) => return Ok((outcome, ticket)),
                        Err(err) if err.kind.is_transient() => err.message,
                        Err(err) => return Err(err.into()),
                    }
                }
                Err(exhausted) => {
                    self.stats.record_admission_timeout();
                    let message = exhausted.to_string();
                    self.sink.get().record(SENDER, &message, Severity::Error);
                    message
                }
            };

            if attempt > self.max_retries {
                return Err(CoreError::could_not_connect(attempt, failure));
            }
            self.stats.record_retry();
            warn!(attempt, "transient failure, retrying: {failure}");
        }
    }
}

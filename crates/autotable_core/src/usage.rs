//! Persisted daily usage.
//!
//! [`DailyUsage`] folds the in-memory request counter of a [`Database`] into
//! one row per calendar day, so request volume survives restarts.
//!
//! ```rust,ignore
//! let usage = DailyUsage::new(&db);
//! // ... work ...
//! usage.flush_if_due()?;
//! for day in usage.recent(30)? {
//!     println!("{}: {} requests", day.date, day.requests);
//! }
//! ```

use crate::database::{Database, DatabaseInner};
use crate::error::CoreResult;
use crate::handler::{Handler, HandlerOptions};
use crate::query::{OrderBy, Query};
use crate::record::Record;
use crate::schema::SchemaBuilder;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use std::sync::Weak;
use std::time::{Duration, Instant};
use tracing::debug;

/// Table holding [`DailyStats`] rows.
pub const DAILY_STATS_TABLE: &str = "autotable_DatabaseStats";

/// How long [`DailyUsage::flush_if_due`] lets requests accumulate.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(15 * 60);

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Requests issued on one day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyStats {
    /// Row id.
    pub id: i32,
    /// Physical requests counted that day.
    pub requests: i32,
    /// The day, as `YYYY-MM-DD`.
    pub date: String,
}

impl Record for DailyStats {
    fn entity_name() -> &'static str {
        "DatabaseStats"
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.int("Requests", |s| s.requests, |s, v| s.requests = v);
        schema
            .string("Date", |s| s.date.clone(), |s, v| s.date = v)
            .size(75);
    }
}

#[derive(Debug)]
struct FlushState {
    /// Counter value already written to the table.
    baseline: u64,
    last_flush: Instant,
}

/// Writes a database's request count to [`DAILY_STATS_TABLE`].
///
/// Counting itself stays in memory; a flush adds the requests seen since the
/// previous flush to the row of the current day.
pub struct DailyUsage {
    db: Weak<DatabaseInner>,
    state: Mutex<FlushState>,
}

impl std::fmt::Debug for DailyUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyUsage")
            .field("attached", &(self.db.strong_count() > 0))
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl DailyUsage {
    /// Creates a recorder for `db`. Requests already counted are included
    /// in the first flush.
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.downgrade(),
            state: Mutex::new(FlushState {
                baseline: 0,
                last_flush: Instant::now(),
            }),
        }
    }

    fn attach(&self) -> Option<(Database, Handler<DailyStats>)> {
        let db = Database::from_inner(self.db.upgrade()?);
        let handler = db
            .handler_with(
                HandlerOptions::new()
                    .table_name(DAILY_STATS_TABLE)
                    .log_errors(false)
                    .cache_enabled(false),
            )
            .ok()?;
        Some((db, handler))
    }

    /// Flushes under today's UTC date.
    ///
    /// # Errors
    ///
    /// Returns the handler error if the row cannot be read or written.
    pub fn flush(&self) -> CoreResult<Option<DailyStats>> {
        self.flush_on(Utc::now().date_naive())
    }

    /// Flushes if [`FLUSH_INTERVAL`] has passed since the last flush.
    ///
    /// # Errors
    ///
    /// Returns the handler error if the row cannot be read or written.
    pub fn flush_if_due(&self) -> CoreResult<Option<DailyStats>> {
        if self.state.lock().last_flush.elapsed() < FLUSH_INTERVAL {
            return Ok(None);
        }
        self.flush()
    }

    /// Adds the requests counted since the last flush to the row for `day`.
    ///
    /// Returns the updated row, or `None` once the database is gone. The
    /// flush's own requests are counted toward the next one.
    ///
    /// # Errors
    ///
    /// Returns the handler error if the row cannot be read or written. The
    /// pending requests are kept for the next flush.
    pub fn flush_on(&self, day: NaiveDate) -> CoreResult<Option<DailyStats>> {
        let Some((db, handler)) = self.attach() else {
            return Ok(None);
        };
        let mut state = self.state.lock();
        let counted = db.stats().requests();
        let pending = counted.saturating_sub(state.baseline);
        let pending = i32::try_from(pending).unwrap_or(i32::MAX);

        let date = day.format(DATE_FORMAT).to_string();
        let row = match handler.get_item_where(Query::by_field("Date", date.as_str()))? {
            Some(mut row) => {
                row.requests = row.requests.saturating_add(pending);
                handler.update(row)?
            }
            None => handler.add(DailyStats {
                id: 0,
                requests: pending,
                date,
            })?,
        };
        state.baseline = counted;
        state.last_flush = Instant::now();
        debug!(date = %row.date, requests = row.requests, "daily usage flushed");
        Ok(Some(row))
    }

    /// The row for `day`, if one was written.
    ///
    /// # Errors
    ///
    /// Returns the handler error if the table cannot be read.
    pub fn by_date(&self, day: NaiveDate) -> CoreResult<Option<DailyStats>> {
        let Some((_, handler)) = self.attach() else {
            return Ok(None);
        };
        let date = day.format(DATE_FORMAT).to_string();
        handler.get_item_where(Query::by_field("Date", date.as_str()))
    }

    /// The last `days` rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns the handler error if the table cannot be read.
    pub fn recent(&self, days: u64) -> CoreResult<Vec<DailyStats>> {
        let Some((_, handler)) = self.attach() else {
            return Ok(Vec::new());
        };
        handler.get_items(Query::all().order_by(OrderBy::desc("ID")).limit(days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn flushes_accumulate_per_day() {
        let db = Database::open_in_memory().unwrap();
        let usage = DailyUsage::new(&db);

        let first = usage.flush_on(day(1)).unwrap().unwrap();
        assert_eq!(first.date, "2024-05-01");

        let counted = db.stats().requests();
        let second = usage.flush_on(day(1)).unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(
            i64::from(second.requests),
            i64::try_from(counted).unwrap()
        );

        let next_day = usage.flush_on(day(2)).unwrap().unwrap();
        assert_ne!(next_day.id, first.id);
        assert!(next_day.requests > 0);

        let recent = usage.recent(30).unwrap();
        let dates: Vec<&str> = recent.iter().map(|s| s.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-05-02", "2024-05-01"]);
        assert_eq!(usage.by_date(day(1)).unwrap(), Some(second));
        assert!(usage.by_date(day(3)).unwrap().is_none());
    }

    #[test]
    fn nothing_is_due_right_away() {
        let db = Database::open_in_memory().unwrap();
        let usage = DailyUsage::new(&db);
        assert!(usage.flush_if_due().unwrap().is_none());
    }

    #[test]
    fn detached_recorder_is_silent() {
        let db = Database::open_in_memory().unwrap();
        let usage = DailyUsage::new(&db);
        drop(db);
        assert!(usage.flush_on(day(1)).unwrap().is_none());
        assert!(usage.recent(5).unwrap().is_empty());
    }
}

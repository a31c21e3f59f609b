//! Usage statistics.
//!
//! Provides counters for monitoring how the engine talks to the database.
//!
//! # Usage
//!
//! ```rust,ignore
//! use autotable_core::Database;
//!
//! let db = Database::open_in_memory()?;
//!
//! // Perform operations...
//! notes.get_all()?;
//!
//! let stats = db.stats();
//! println!("Requests: {}", stats.requests());
//! println!("Cache hits: {}", stats.cache_hits());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Receives one tick per physical database request.
///
/// This is the narrow interface the engine consumes; [`DatabaseStats`] is
/// the built-in implementation.
pub trait UsageCounter: Send + Sync {
    /// Counts one request.
    fn increment_request_count(&self);
}

/// Database statistics.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    /// Physical requests sent to the backend, retries included.
    requests: AtomicU64,
    /// Reads answered from the cache.
    cache_hits: AtomicU64,
    /// Reads that went to the backend.
    cache_misses: AtomicU64,
    /// Successful schema repairs (create or restructure).
    schema_repairs: AtomicU64,
    /// Transient failures that were retried.
    transient_retries: AtomicU64,
    /// Connection slot waits that timed out.
    admission_timeouts: AtomicU64,
    /// Rows dropped by the row mapper.
    skipped_rows: AtomicU64,
    /// Operations that returned an error.
    errors: AtomicU64,
}

impl DatabaseStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_repair(&self) {
        self.schema_repairs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.transient_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_admission_timeout(&self) {
        self.admission_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped_rows(&self, count: u64) {
        self.skipped_rows.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of physical requests.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Returns the number of cache hits.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Returns the number of cache misses.
    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    /// Returns the number of schema repairs.
    pub fn schema_repairs(&self) -> u64 {
        self.schema_repairs.load(Ordering::Relaxed)
    }

    /// Returns the number of transient retries.
    pub fn transient_retries(&self) -> u64 {
        self.transient_retries.load(Ordering::Relaxed)
    }

    /// Returns the number of admission timeouts.
    pub fn admission_timeouts(&self) -> u64 {
        self.admission_timeouts.load(Ordering::Relaxed)
    }

    /// Returns the number of skipped rows.
    pub fn skipped_rows(&self) -> u64 {
        self.skipped_rows.load(Ordering::Relaxed)
    }

    /// Returns the number of failed operations.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests(),
            cache_hits: self.cache_hits(),
            cache_misses: self.cache_misses(),
            schema_repairs: self.schema_repairs(),
            transient_retries: self.transient_retries(),
            admission_timeouts: self.admission_timeouts(),
            skipped_rows: self.skipped_rows(),
            errors: self.errors(),
        }
    }
}

impl UsageCounter for DatabaseStats {
    fn increment_request_count(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of database statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Physical requests sent to the backend.
    pub requests: u64,
    /// Reads answered from the cache.
    pub cache_hits: u64,
    /// Reads that went to the backend.
    pub cache_misses: u64,
    /// Successful schema repairs.
    pub schema_repairs: u64,
    /// Transient failures that were retried.
    pub transient_retries: u64,
    /// Connection slot waits that timed out.
    pub admission_timeouts: u64,
    /// Rows dropped by the row mapper.
    pub skipped_rows: u64,
    /// Operations that returned an error.
    pub errors: u64,
}

/// Measures the requests and time spent by one unit of work, such as
/// serving a page.
#[derive(Debug, Clone, Copy)]
pub struct RequestMeter {
    started: Instant,
    requests_at_start: u64,
}

impl RequestMeter {
    /// Starts measuring against `stats`.
    pub fn start(stats: &DatabaseStats) -> Self {
        Self {
            started: Instant::now(),
            requests_at_start: stats.requests(),
        }
    }

    /// Requests and time since [`Self::start`].
    pub fn reading(&self, stats: &DatabaseStats) -> MeterReading {
        MeterReading {
            elapsed: self.started.elapsed(),
            requests: stats.requests().saturating_sub(self.requests_at_start),
        }
    }
}

/// What a [`RequestMeter`] saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterReading {
    /// Wall time.
    pub elapsed: Duration,
    /// Physical requests, retries included.
    pub requests: u64,
}

impl fmt::Display for MeterReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "took {} ms and executed {} queries",
            self.elapsed.as_millis(),
            self.requests
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = DatabaseStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn usage_counter_counts_requests() {
        let stats = DatabaseStats::new();
        let counter: &dyn UsageCounter = &stats;
        counter.increment_request_count();
        counter.increment_request_count();
        assert_eq!(stats.requests(), 2);
    }

    #[test]
    fn meter_counts_requests_since_start() {
        let stats = DatabaseStats::new();
        stats.increment_request_count();
        let meter = RequestMeter::start(&stats);
        stats.increment_request_count();
        stats.increment_request_count();

        let reading = meter.reading(&stats);
        assert_eq!(reading.requests, 2);
        assert!(reading.to_string().ends_with("executed 2 queries"));
    }

    #[test]
    fn snapshot() {
        let stats = DatabaseStats::new();
        stats.record_cache_hit();
        stats.record_cache_miss();
        stats.record_cache_miss();
        stats.record_skipped_rows(3);
        stats.record_repair();

        let snap = stats.snapshot();
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.cache_misses, 2);
        assert_eq!(snap.skipped_rows, 3);
        assert_eq!(snap.schema_repairs, 1);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(DatabaseStats::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    s.increment_request_count();
                    s.record_retry();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.requests(), 1000);
        assert_eq!(stats.transient_retries(), 1000);
    }
}

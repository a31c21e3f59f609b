//! Stress helpers for AutoTable.
//!
//! These drive a handler from many threads at once, to check the admission
//! ceiling and cache coherence under contention.

use crate::fixtures::TestRecord;
use autotable_core::{Handler, OrderBy, Query};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        Self {
            total_ops: successful + failed,
            successful_ops: successful,
            failed_ops: failed,
            duration,
        }
    }

    /// Operations per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_ops as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 50,
            threads: 4,
        }
    }
}

fn run_threads(
    config: &StressConfig,
    op: impl Fn(usize, usize) -> bool + Send + Sync + 'static,
) -> StressTestResult {
    let op = Arc::new(op);
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let operations = config.operations;

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let op = Arc::clone(&op);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            thread::spawn(move || {
                for i in 0..operations {
                    if op(t, i) {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Every thread adds records.
pub fn stress_concurrent_adds(
    handler: &Handler<TestRecord>,
    config: &StressConfig,
) -> StressTestResult {
    let handler = handler.clone();
    run_threads(config, move |t, i| {
        let value = i32::try_from(t * 10_000 + i).unwrap_or(i32::MAX);
        handler
            .add(TestRecord::new(value, format!("thread {t} op {i}")))
            .is_ok()
    })
}

/// Threads alternate between cached reads and writes on one table.
///
/// A read counts as failed if it returns fewer rows than the reading
/// thread itself has already added.
pub fn stress_read_your_writes(
    handler: &Handler<TestRecord>,
    config: &StressConfig,
) -> StressTestResult {
    let handler = handler.clone();
    run_threads(config, move |t, i| {
        let value = i32::try_from(t).unwrap_or(i32::MAX);
        if i % 2 == 0 {
            return handler
                .add(TestRecord::new(value, format!("thread {t}")))
                .is_ok();
        }
        let mine = handler
            .get_items(Query::by_field("IntValue", value).order_by(OrderBy::desc("ID")))
            .map(|rows| rows.len())
            .unwrap_or(0);
        mine >= i.div_ceil(2)
    })
}

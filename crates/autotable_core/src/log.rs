//! Event reporting.
//!
//! The engine reports noteworthy events (skipped rows, failed repairs,
//! exhausted connection slots) through an [`EventSink`]. Reporting is
//! fire-and-forget: a sink never returns an error to the engine.

use crate::error::CoreError;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;

/// How serious a reported event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Normal operation.
    Info,
    /// Something was tolerated (a skipped row, an oversized string).
    Warning,
    /// An operation failed.
    Error,
    /// The engine is misconfigured.
    Critical,
    /// The engine could not continue.
    Failure,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Critical => "Critical",
            Self::Failure => "Failure",
        };
        f.write_str(name)
    }
}

/// Receives events from the engine.
pub trait EventSink: Send + Sync {
    /// Records a message.
    fn record(&self, sender: &str, message: &str, severity: Severity);

    /// Records an error returned by an operation.
    fn record_error(&self, sender: &str, error: &CoreError) {
        self.record(sender, &error.to_string(), Severity::Error);
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, sender: &str, message: &str, severity: Severity) {
        match severity {
            Severity::Info => tracing::info!(sender, "{message}"),
            Severity::Warning => tracing::warn!(sender, "{message}"),
            Severity::Error | Severity::Critical | Severity::Failure => {
                tracing::error!(sender, %severity, "{message}");
            }
        }
    }
}

/// One event kept by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Who reported it.
    pub sender: String,
    /// What happened.
    pub message: String,
    /// How bad it is.
    pub severity: Severity,
}

/// Keeps events in memory. Handy in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every event recorded so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Returns events at or above `severity`.
    pub fn at_least(&self, severity: Severity) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.severity >= severity)
            .cloned()
            .collect()
    }
}

impl EventSink for MemorySink {
    fn record(&self, sender: &str, message: &str, severity: Severity) {
        self.events.lock().push(Event {
            sender: sender.to_string(),
            message: message.to_string(),
            severity,
        });
    }
}

/// The sink currently installed on a database. Swappable at runtime.
pub(crate) struct SinkSlot(RwLock<Arc<dyn EventSink>>);

impl SinkSlot {
    pub(crate) fn new(sink: Arc<dyn EventSink>) -> Self {
        Self(RwLock::new(sink))
    }

    pub(crate) fn get(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.0.read())
    }

    pub(crate) fn set(&self, sink: Arc<dyn EventSink>) {
        *self.0.write() = sink;
    }
}

impl fmt::Debug for SinkSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SinkSlot")
    }
}

//! Connection admission control.
//!
//! A counting permit pool bounds how many physical connections are open at
//! once. A [`Ticket`] is taken before a connection is opened and given back
//! exactly once when it is dropped, whatever path the caller leaves by.
//!
//! The controller also keeps a trace of the statement each ticket holder is
//! running, so an exhausted pool can report what is occupying it.

use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Slots {
    in_use: usize,
    peak: usize,
    next_ticket: u64,
    /// Statement text per live ticket.
    active: BTreeMap<u64, String>,
}

/// Bounds the number of concurrently open connections.
#[derive(Debug)]
pub struct AdmissionController {
    capacity: usize,
    slots: Mutex<Slots>,
    released: Condvar,
}

/// No permit became free before the timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted {
    /// How long the caller waited.
    pub waited: Duration,
    /// Statements running at the time.
    pub active: Vec<String>,
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no connection available after {:?}; {} active",
            self.waited,
            self.active.len()
        )?;
        for query in &self.active {
            write!(f, "\n  {query}")?;
        }
        Ok(())
    }
}

impl AdmissionController {
    /// Creates a controller admitting at most `capacity` holders.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            slots: Mutex::new(Slots::default()),
            released: Condvar::new(),
        })
    }

    /// Returns the configured ceiling.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns how many tickets are out right now.
    pub fn in_use(&self) -> usize {
        self.slots.lock().in_use
    }

    /// Returns the most tickets ever out at once.
    pub fn peak(&self) -> usize {
        self.slots.lock().peak
    }

    /// Returns the statements currently holding tickets.
    pub fn active_queries(&self) -> Vec<String> {
        self.slots.lock().active.values().cloned().collect()
    }

    /// Waits up to `timeout` for a ticket.
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] if no ticket was released in time.
    pub fn acquire(self: &Arc<Self>, timeout: Duration) -> Result<Ticket, Exhausted> {
        let started = Instant::now();
        let deadline = started.checked_add(timeout);
        let mut slots = self.slots.lock();
        while slots.in_use >= self.capacity {
            let timed_out = match deadline {
                Some(deadline) => self.released.wait_until(&mut slots, deadline).timed_out(),
                None => {
                    self.released.wait(&mut slots);
                    false
                }
            };
            if timed_out && slots.in_use >= self.capacity {
                return Err(Exhausted {
                    waited: started.elapsed(),
                    active: slots.active.values().cloned().collect(),
                });
            }
        }
        slots.in_use += 1;
        slots.peak = slots.peak.max(slots.in_use);
        slots.next_ticket += 1;
        let id = slots.next_ticket;
        slots.active.insert(id, String::new());
        Ok(Ticket {
            controller: Arc::clone(self),
            id,
        })
    }

    fn release(&self, id: u64) {
        let mut slots = self.slots.lock();
        slots.active.remove(&id);
        slots.in_use = slots.in_use.saturating_sub(1);
        drop(slots);
        self.released.notify_one();
    }
}

/// Permission to hold one open connection. Released on drop.
pub struct Ticket {
    controller: Arc<AdmissionController>,
    id: u64,
}

impl Ticket {
    /// Records the statement this holder is running.
    pub fn trace(&self, query: &str) {
        if let Some(slot) = self.controller.slots.lock().active.get_mut(&self.id) {
            slot.clear();
            slot.push_str(query.trim());
        }
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket").field("id", &self.id).finish()
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.controller.release(self.id);
    }
}

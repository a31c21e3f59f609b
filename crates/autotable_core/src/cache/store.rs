//! Generic key/value cache store.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A type-erased cached value.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// A process-wide cache with expiry.
///
/// The query cache is built on top of this trait; plug in another store to
/// share cached reads differently.
pub trait CacheStore: Send + Sync {
    /// Returns the value under `key` if present and not expired.
    fn get(&self, key: &str) -> Option<CachedValue>;

    /// Stores `value` under `key` for `ttl`.
    fn set(&self, key: &str, value: CachedValue, ttl: Duration);

    /// Removes every entry whose key starts with `prefix`. Returns the count.
    fn remove_matching(&self, prefix: &str) -> usize;
}

struct Entry {
    value: CachedValue,
    /// `None` when the TTL is too large to represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Entry count at which [`MemoryCacheStore::set`] first sweeps expired entries.
pub const DEFAULT_PURGE_THRESHOLD: usize = 1024;

/// An in-process [`CacheStore`].
///
/// `set` sweeps expired entries once the map grows past a threshold. The
/// next sweep waits until the map is twice the size the last one left.
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
    threshold: usize,
    purge_at: AtomicUsize,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::with_purge_threshold(DEFAULT_PURGE_THRESHOLD)
    }
}

impl std::fmt::Debug for MemoryCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheStore")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

impl MemoryCacheStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that sweeps once it holds more than
    /// `threshold` entries.
    pub fn with_purge_threshold(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            entries: RwLock::new(HashMap::new()),
            threshold,
            purge_at: AtomicUsize::new(threshold),
        }
    }

    /// Returns the number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops expired entries.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        self.sweep(&mut entries)
    }

    fn sweep(&self, entries: &mut HashMap<String, Entry>) -> usize {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        let next = self.threshold.max(entries.len().saturating_mul(2));
        self.purge_at.store(next, Ordering::Relaxed);
        before - entries.len()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<CachedValue> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        entry
            .is_live(Instant::now())
            .then(|| Arc::clone(&entry.value))
    }

    fn set(&self, key: &str, value: CachedValue, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now().checked_add(ttl),
        };
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), entry);
        if entries.len() > self.purge_at.load(Ordering::Relaxed) {
            self.sweep(&mut entries);
        }
    }

    fn remove_matching(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        before - entries.len()
    }
}

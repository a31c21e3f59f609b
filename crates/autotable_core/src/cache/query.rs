//! Per-entity query result cache.

use super::store::{CacheStore, CachedValue};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const SEPARATOR: char = '\u{1f}';

/// Memoises read results per `(entity, operation, arguments)`.
///
/// Every write to an entity drops all cached reads of that entity. A read
/// captures the entity's generation before it queries and only stores its
/// result if no write happened in between, so a read that raced a write can
/// never put pre-write data back into the cache.
pub struct QueryCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    enabled: bool,
    generations: Mutex<HashMap<String, u64>>,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("ttl", &self.ttl)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl QueryCache {
    /// Creates a cache on top of `store`.
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, enabled: bool) -> Self {
        Self {
            store,
            ttl,
            enabled,
            generations: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if caching is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Builds the store key.
    pub fn key(entity: &str, op: &str, args: &[String]) -> String {
        let mut key = String::with_capacity(entity.len() + op.len() + 16);
        key.push_str(entity);
        key.push(SEPARATOR);
        key.push_str(op);
        for arg in args {
            key.push(SEPARATOR);
            key.push_str(arg);
        }
        key
    }

    fn prefix(entity: &str) -> String {
        format!("{entity}{SEPARATOR}")
    }

    /// Returns the entity's current write generation.
    pub fn generation(&self, entity: &str) -> u64 {
        self.generations.lock().get(entity).copied().unwrap_or(0)
    }

    /// Looks up a cached value of type `V`.
    pub fn get<V>(&self, entity: &str, op: &str, args: &[String]) -> Option<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        if !self.enabled {
            return None;
        }
        let hit = self.store.get(&Self::key(entity, op, args))?;
        hit.downcast_ref::<V>().cloned()
    }

    /// Stores `value` if the entity is still at `generation`.
    ///
    /// Returns true if the value was stored.
    pub fn put<V>(&self, entity: &str, op: &str, args: &[String], value: V, generation: u64) -> bool
    where
        V: Send + Sync + 'static,
    {
        if !self.enabled {
            return false;
        }
        let generations = self.generations.lock();
        if generations.get(entity).copied().unwrap_or(0) != generation {
            return false;
        }
        let value: CachedValue = Arc::new(value);
        self.store
            .set(&Self::key(entity, op, args), value, self.ttl);
        true
    }

    /// Drops every cached read of `entity`.
    pub fn invalidate_all(&self, entity: &str) -> usize {
        let mut generations = self.generations.lock();
        *generations.entry(entity.to_string()).or_insert(0) += 1;
        self.store.remove_matching(&Self::prefix(entity))
    }
}

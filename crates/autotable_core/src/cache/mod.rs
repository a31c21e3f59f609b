//! Read result caching.
//!
//! - [`CacheStore`] - generic expiring key/value store
//! - [`MemoryCacheStore`] - the in-process store used by default
//! - [`QueryCache`] - per-entity memoisation with invalidate-on-write

mod query;
mod store;

pub use query::QueryCache;
pub use store::{CacheStore, CachedValue, MemoryCacheStore, DEFAULT_PURGE_THRESHOLD};

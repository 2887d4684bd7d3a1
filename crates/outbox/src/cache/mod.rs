//! Shared cache abstraction
//!
//! The cache-backed outbox only needs a handful of primitives: plain
//! get/set/delete plus an atomic set-if-absent ([`Cache::add`]) that the
//! [`IndexLock`] builds its mutual exclusion on. Two engines are provided:
//! a process-local map and a SQLite table that several processes can share.

mod lock;
mod memory;
mod registry;
mod sqlite;
mod traits;

pub use lock::{IndexLock, LockGuard, LockSettings, ReleaseOutcome};
pub use memory::InMemoryCache;
pub use registry::{CacheConfig, Caches, DEFAULT_CACHE_ALIAS};
pub use sqlite::SqliteCache;
pub use traits::Cache;

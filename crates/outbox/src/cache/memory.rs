//! In-memory cache implementation
//!
//! Visible to every thread holding the same `Arc`, but not to other
//! processes. Use [`super::SqliteCache`] when writers live in separate
//! processes.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::Cache;

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: &[u8], timeout: Option<Duration>) -> Self {
        Self {
            value: value.to_vec(),
            // Past the clock's range means never
            expires_at: timeout.and_then(|t| Instant::now().checked_add(t)),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory implementation of Cache
///
/// A single RwLock guards the map so `add` is atomic with respect to every
/// other operation.
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().unwrap();
        entries.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap();
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap();
        Ok(keys
            .iter()
            .filter_map(|key| {
                entries
                    .get(key)
                    .filter(|e| e.is_live(now))
                    .map(|e| (key.clone(), e.value.clone()))
            })
            .collect())
    }

    fn set(&self, key: &str, value: &[u8], timeout: Option<Duration>) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.insert(key.to_string(), CacheEntry::new(value, timeout));
        Ok(())
    }

    fn add(&self, key: &str, value: &[u8], timeout: Option<Duration>) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();

        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }

        entries.insert(key.to_string(), CacheEntry::new(value, timeout));
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        Ok(entries.remove(key).is_some_and(|e| e.is_live(now)))
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().unwrap().clear();
        Ok(())
    }
}

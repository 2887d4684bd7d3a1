//! Cache-backed storage shared between processes
//!
//! Each message is one cache entry holding its raw RFC 5322 bytes, keyed by
//! its `Message-ID`. A separate JSON entry, [`INDEX_KEY`], lists the keys in
//! the order they were sent. Entries are written without locking (keys are
//! unique); only the read-modify-write of the index goes through the
//! [`IndexLock`]. Readers never lock, so they may briefly see an index key
//! whose entry is gone and skip it.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use super::OutboxStore;
use crate::cache::{Cache, IndexLock, LockSettings};
use crate::error::OutboxError;
use crate::models::{Email, MessageId, StoredMessage};

/// Cache key of the JSON list of stored message keys
pub const INDEX_KEY: &str = "message_keys";

/// Cache key of the lock guarding [`INDEX_KEY`]
pub const INDEX_LOCK_KEY: &str = "message_keys_lock";

/// Cache-based implementation of OutboxStore
pub struct CacheOutbox {
    cache: Arc<dyn Cache>,
    lock: IndexLock,
}

impl CacheOutbox {
    /// Create an outbox over `cache` with the default lock timings
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self::with_lock_settings(cache, &LockSettings::default())
    }

    pub fn with_lock_settings(cache: Arc<dyn Cache>, settings: &LockSettings) -> Self {
        let lock = IndexLock::with_settings(cache.clone(), INDEX_LOCK_KEY, settings);
        Self { cache, lock }
    }

    /// Keys currently listed in the index, in send order
    pub fn message_keys(&self) -> Result<Vec<String>> {
        match self.cache.get(INDEX_KEY)? {
            Some(json) => serde_json::from_slice(&json).context("Failed to parse message index"),
            None => Ok(Vec::new()),
        }
    }

    fn write_index(&self, keys: &[String]) -> Result<()> {
        let json = serde_json::to_vec(keys).context("Failed to serialize message index")?;
        self.cache.set(INDEX_KEY, &json, None)
    }

    /// Append `key` to the index under the lock
    fn append_to_index(&self, key: &str) -> Result<()> {
        let _guard = self.lock.acquire()?;

        let mut keys = self.message_keys()?;
        if keys.iter().any(|k| k == key) {
            debug!("[CACHE] {} already indexed", key);
            return Ok(());
        }
        keys.push(key.to_string());
        self.write_index(&keys)
    }

    fn parse_entry(id: &str, raw: Vec<u8>) -> Result<StoredMessage> {
        let email = Email::from_raw(raw)
            .with_context(|| format!("Cached entry for {} is not a valid message", id))?;
        Ok(StoredMessage::from_email(&email))
    }
}

impl OutboxStore for CacheOutbox {
    fn store(&self, messages: &[Email]) -> Result<usize> {
        let mut stored = 0;

        for email in messages {
            let key = email.message_id().as_str();
            self.cache
                .set(key, email.raw(), None)
                .with_context(|| format!("Failed to cache message {}", key))?;

            match self.append_to_index(key) {
                Ok(()) => stored += 1,
                Err(e) if OutboxError::is_lock_exhausted(&e) => {
                    warn!("[CACHE] Not storing {}: {:#}", key, e);
                    // Leave no unlisted entry behind, unless an earlier send listed it
                    if !self.message_keys()?.iter().any(|k| k == key) {
                        self.cache.delete(key)?;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        info!("[CACHE] Stored {}/{} message(s)", stored, messages.len());
        Ok(stored)
    }

    fn get(&self, id: &MessageId) -> Result<Option<StoredMessage>> {
        match self.cache.get(id.as_str())? {
            Some(raw) => Self::parse_entry(id.as_str(), raw).map(Some),
            None => Ok(None),
        }
    }

    fn list_all(&self) -> Result<Vec<StoredMessage>> {
        let keys = self.message_keys()?;
        let mut entries = self.cache.get_many(&keys)?;

        let mut messages = Vec::with_capacity(keys.len());
        for key in &keys {
            let Some(raw) = entries.remove(key) else {
                warn!("[CACHE] Index lists {} but its entry is missing, skipping", key);
                continue;
            };
            match Self::parse_entry(key, raw) {
                Ok(message) => messages.push(message),
                Err(e) => warn!("[CACHE] Skipping unreadable entry: {:#}", e),
            }
        }
        Ok(messages)
    }

    fn delete(&self, id: &MessageId) -> Result<()> {
        let _guard = self.lock.acquire()?;

        let mut keys = self.message_keys()?;
        let position = keys
            .iter()
            .position(|k| k == id.as_str())
            .ok_or_else(|| OutboxError::NotFound(id.clone()))?;

        let removed = self.cache.delete(id.as_str())?;
        keys.remove(position);
        self.write_index(&keys)?;

        if !removed {
            warn!("[CACHE] Dropped {} from the index, its entry was already gone", id);
            return Err(OutboxError::IndexCorrupted(id.clone()).into());
        }

        info!("[CACHE] Deleted {}", id);
        Ok(())
    }
}

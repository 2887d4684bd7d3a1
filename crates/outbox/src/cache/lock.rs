//! Best-effort cross-process lock built on [`Cache::add`]
//!
//! Acquisition stores an owner token under the lock key with an expiry; a
//! failed attempt sleeps and retries up to a fixed budget. Release deletes
//! the key, but only while the holder is still inside its expiry window:
//! once the window has passed another process may legitimately hold the
//! key, so the stale holder leaves it alone.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::Cache;
use crate::error::OutboxError;

static OWNER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Lock timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// Seconds before an unreleased lock expires on its own
    pub expires_secs: u64,
    /// Acquisition attempts before giving up
    pub max_retries: u32,
    /// Milliseconds to sleep between attempts
    pub retry_interval_ms: u64,
}

impl LockSettings {
    pub fn expires(&self) -> Duration {
        Duration::from_secs(self.expires_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            expires_secs: 180,
            max_retries: 100,
            retry_interval_ms: 10,
        }
    }
}

/// Outcome of releasing a [`LockGuard`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The lock key was deleted
    Released,
    /// The expiry window had passed, so the key was left alone
    Expired,
}

/// Mutual exclusion over a single cache key
pub struct IndexLock {
    cache: Arc<dyn Cache>,
    key: String,
    expires: Duration,
    max_retries: u32,
    retry_interval: Duration,
}

impl IndexLock {
    /// Create a lock with the default timings (180s expiry, 100 x 10ms retries)
    pub fn new(cache: Arc<dyn Cache>, key: impl Into<String>) -> Self {
        Self::with_settings(cache, key, &LockSettings::default())
    }

    pub fn with_settings(cache: Arc<dyn Cache>, key: impl Into<String>, settings: &LockSettings) -> Self {
        Self {
            cache,
            key: key.into(),
            expires: settings.expires(),
            max_retries: settings.max_retries,
            retry_interval: settings.retry_interval(),
        }
    }

    /// Override the expiry window
    pub fn expires_after(mut self, expires: Duration) -> Self {
        self.expires = expires;
        self
    }

    /// Override the retry budget
    pub fn retries(mut self, max_retries: u32, retry_interval: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_interval = retry_interval;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Make a single acquisition attempt
    pub fn try_acquire(&self) -> Result<Option<LockGuard<'_>>> {
        let owner = new_owner_token();
        // Taken before the cache computes the expiry, so local age never undercounts
        let started = Instant::now();
        if !self.cache.add(&self.key, owner.as_bytes(), Some(self.expires))? {
            return Ok(None);
        }

        debug!("[LOCK] Acquired {} as {}", self.key, owner);
        Ok(Some(LockGuard {
            lock: self,
            owner,
            acquired_at: started,
            released: false,
        }))
    }

    /// Acquire the lock, spinning until the retry budget runs out
    ///
    /// Blocks for at most `max_retries x retry_interval`. Fails with
    /// [`OutboxError::LockExhausted`] when every attempt found the key held.
    pub fn acquire(&self) -> Result<LockGuard<'_>> {
        for attempt in 1..=self.max_retries {
            if let Some(guard) = self.try_acquire()? {
                return Ok(guard);
            }
            if attempt < self.max_retries {
                thread::sleep(self.retry_interval);
            }
        }

        warn!(
            "[LOCK] Gave up on {} after {} attempts",
            self.key, self.max_retries
        );
        Err(OutboxError::LockExhausted {
            key: self.key.clone(),
            attempts: self.max_retries,
        }
        .into())
    }
}

/// A held lock; releases on drop
pub struct LockGuard<'a> {
    lock: &'a IndexLock,
    owner: String,
    acquired_at: Instant,
    released: bool,
}

impl LockGuard<'_> {
    /// Token stored under the lock key while held
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Release now and report what happened
    pub fn release(mut self) -> Result<ReleaseOutcome> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<ReleaseOutcome> {
        self.released = true;

        if self.acquired_at.elapsed() > self.lock.expires {
            warn!(
                "[LOCK] {} held past its {:?} expiry by {}, skipping release",
                self.lock.key, self.lock.expires, self.owner
            );
            return Ok(ReleaseOutcome::Expired);
        }

        self.lock.cache.delete(&self.lock.key)?;
        debug!("[LOCK] Released {} held by {}", self.lock.key, self.owner);
        Ok(ReleaseOutcome::Released)
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.release_inner() {
            warn!("[LOCK] Failed to release {}: {:#}", self.lock.key, e);
        }
    }
}

/// Unique enough across processes and threads: pid, clock and a counter
fn new_owner_token() -> String {
    format!(
        "{}-{}-{}",
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        OWNER_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

//! SQLite-backed cache shared between processes
//!
//! Every process opens its own connection to the same database file. `add`
//! is a single upsert statement, so SQLite's write lock makes it atomic
//! across connections.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::Cache;

/// How long a connection waits on another process's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            CREATE TABLE cache_entries (
                cache_key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                expires_at INTEGER  -- unix millis, NULL = never
            );

            CREATE INDEX idx_cache_entries_expires_at ON cache_entries(expires_at);
            "#,
        ),
    ])
}

/// Absolute expiry in unix millis, saturating for timeouts beyond the representable range
fn expiry_millis(timeout: Option<Duration>) -> Option<i64> {
    timeout.map(|t| {
        let millis = i64::try_from(t.as_millis()).unwrap_or(i64::MAX);
        Utc::now().timestamp_millis().saturating_add(millis)
    })
}

/// SQLite-based cache
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open (or create) a cache database
    ///
    /// Open the file once before spawning concurrent writers so the schema
    /// migration doesn't race.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open cache database at {:?}", db_path.as_ref()))?;

        conn.busy_timeout(BUSY_TIMEOUT)?;

        // WAL lets readers in other processes proceed while one writes
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run cache migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Delete entries whose timeout has passed
    pub fn purge_expired(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?",
            [Utc::now().timestamp_millis()],
        )?;
        Ok(removed)
    }

    fn get_with(conn: &Connection, key: &str, now: i64) -> Result<Option<Vec<u8>>> {
        let value = conn
            .query_row(
                "SELECT value FROM cache_entries
                 WHERE cache_key = ? AND (expires_at IS NULL OR expires_at > ?)",
                params![key, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

impl Cache for SqliteCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        Self::get_with(&conn, key, Utc::now().timestamp_millis())
    }

    fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().timestamp_millis();

        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = Self::get_with(&conn, key, now)? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    fn set(&self, key: &str, value: &[u8], timeout: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?",
            [Utc::now().timestamp_millis()],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO cache_entries (cache_key, value, expires_at) VALUES (?, ?, ?)",
            params![key, value, expiry_millis(timeout)],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn add(&self, key: &str, value: &[u8], timeout: Option<Duration>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();

        // Inserts, or replaces an expired entry; a live entry leaves 0 rows changed
        let changed = conn.execute(
            "INSERT INTO cache_entries (cache_key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE
                SET value = excluded.value, expires_at = excluded.expires_at
                WHERE cache_entries.expires_at IS NOT NULL AND cache_entries.expires_at <= ?4",
            params![
                key,
                value,
                expiry_millis(timeout),
                Utc::now().timestamp_millis()
            ],
        )?;

        Ok(changed == 1)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().timestamp_millis();
        let removed = conn.execute(
            "DELETE FROM cache_entries
             WHERE cache_key = ? AND (expires_at IS NULL OR expires_at > ?)",
            params![key, now],
        )?;
        // Drop an expired leftover too, without reporting it as live
        conn.execute(
            "DELETE FROM cache_entries WHERE cache_key = ? AND expires_at <= ?",
            params![key, now],
        )?;
        Ok(removed > 0)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM cache_entries", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn create_test_cache() -> (SqliteCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteCache::new(dir.path().join("cache.sqlite3")).unwrap();
        (cache, dir)
    }

    #[test]
    fn test_set_get_delete() {
        let (cache, _dir) = create_test_cache();

        assert!(cache.get("k").unwrap().is_none());
        cache.set("k", b"v", None).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(b"v".to_vec()));

        cache.set("k", b"w", None).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(b"w".to_vec()));

        assert!(cache.delete("k").unwrap());
        assert!(!cache.delete("k").unwrap());
    }

    #[test]
    fn test_huge_timeout_saturates() {
        assert_eq!(expiry_millis(Some(Duration::MAX)), Some(i64::MAX));
        assert_eq!(expiry_millis(None), None);

        let (cache, _dir) = create_test_cache();
        cache.set("forever", b"v", Some(Duration::MAX)).unwrap();
        assert_eq!(cache.get("forever").unwrap(), Some(b"v".to_vec()));
        assert!(!cache.add("forever", b"w", None).unwrap());
    }

    #[test]
    fn test_add_only_if_absent() {
        let (cache, _dir) = create_test_cache();

        assert!(cache.add("lock", b"a", None).unwrap());
        assert!(!cache.add("lock", b"b", None).unwrap());
        assert_eq!(cache.get("lock").unwrap(), Some(b"a".to_vec()));
    }

    #[test]
    fn test_add_replaces_expired_entry() {
        let (cache, _dir) = create_test_cache();

        assert!(cache
            .add("lock", b"a", Some(Duration::from_millis(20)))
            .unwrap());
        thread::sleep(Duration::from_millis(40));

        assert!(cache.get("lock").unwrap().is_none());
        assert!(cache.add("lock", b"b", None).unwrap());
        assert_eq!(cache.get("lock").unwrap(), Some(b"b".to_vec()));
    }

    #[test]
    fn test_visible_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.sqlite3");

        let first = SqliteCache::new(&path).unwrap();
        let second = SqliteCache::new(&path).unwrap();

        first.set("message", b"hello", None).unwrap();
        assert_eq!(second.get("message").unwrap(), Some(b"hello".to_vec()));

        assert!(second.add("lock", b"two", None).unwrap());
        assert!(!first.add("lock", b"one", None).unwrap());
    }

    #[test]
    fn test_purge_expired() {
        let (cache, _dir) = create_test_cache();

        cache
            .set("short", b"v", Some(Duration::from_millis(10)))
            .unwrap();
        cache.set("long", b"v", None).unwrap();
        thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert!(cache.get("long").unwrap().is_some());
    }

    #[test]
    fn test_get_many_and_clear() {
        let (cache, _dir) = create_test_cache();
        cache.set("a", b"1", None).unwrap();
        cache.set("b", b"2", None).unwrap();

        let keys = vec!["a".to_string(), "missing".to_string(), "b".to_string()];
        let found = cache.get_many(&keys).unwrap();
        assert_eq!(found.len(), 2);

        cache.clear().unwrap();
        assert!(cache.get_many(&keys).unwrap().is_empty());
    }
}

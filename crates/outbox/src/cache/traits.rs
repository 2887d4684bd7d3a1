//! Cache trait definition

use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;

/// Trait for key/value cache operations
///
/// Values are opaque bytes. A `timeout` of `None` keeps the entry until it is
/// deleted; expired entries behave exactly like absent ones.
pub trait Cache: Send + Sync {
    /// Get a value, `None` if absent or expired
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Get every present value among `keys`
    ///
    /// Absent or expired keys are simply missing from the result.
    fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key)? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    /// Insert or overwrite a value
    fn set(&self, key: &str, value: &[u8], timeout: Option<Duration>) -> Result<()>;

    /// Atomically insert a value only if the key is absent or expired
    ///
    /// Returns `true` if this call stored the value.
    fn add(&self, key: &str, value: &[u8], timeout: Option<Duration>) -> Result<bool>;

    /// Delete a value, returning whether a live entry was removed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every entry
    fn clear(&self) -> Result<()>;
}

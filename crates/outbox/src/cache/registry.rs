//! Named cache instances

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};

use super::{Cache, InMemoryCache, SqliteCache};

/// Alias used when settings don't name a cache
pub const DEFAULT_CACHE_ALIAS: &str = "default";

/// How to build one cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CacheConfig {
    /// Process-local map
    Memory,
    /// SQLite file shared by every process that opens it
    Sqlite { path: PathBuf },
}

impl CacheConfig {
    pub fn build(&self) -> Result<Arc<dyn Cache>> {
        Ok(match self {
            CacheConfig::Memory => Arc::new(InMemoryCache::new()),
            CacheConfig::Sqlite { path } => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create cache directory {:?}", parent)
                    })?;
                }
                Arc::new(SqliteCache::new(path)?)
            }
        })
    }
}

/// Registry of caches by alias
#[derive(Default)]
pub struct Caches {
    caches: HashMap<String, Arc<dyn Cache>>,
}

impl Caches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured cache
    ///
    /// With no entries at all, `default` is an in-memory cache.
    pub fn from_settings(configs: &HashMap<String, CacheConfig>) -> Result<Self> {
        let mut caches = Self::new();

        for (alias, config) in configs {
            debug!("[CACHE] Building {} cache '{}'", backend_name(config), alias);
            let cache = config
                .build()
                .with_context(|| format!("Failed to build cache '{}'", alias))?;
            caches.insert(alias.clone(), cache);
        }

        if caches.caches.is_empty() {
            caches.insert(DEFAULT_CACHE_ALIAS, Arc::new(InMemoryCache::new()));
        }

        Ok(caches)
    }

    pub fn insert(&mut self, alias: impl Into<String>, cache: Arc<dyn Cache>) {
        self.caches.insert(alias.into(), cache);
    }

    /// Look up a cache by alias
    pub fn get(&self, alias: &str) -> Result<Arc<dyn Cache>> {
        self.caches.get(alias).cloned().ok_or_else(|| {
            let mut known: Vec<_> = self.caches.keys().map(String::as_str).collect();
            known.sort_unstable();
            anyhow!("No cache named '{}' (configured: {})", alias, known.join(", "))
        })
    }
}

fn backend_name(config: &CacheConfig) -> &'static str {
    match config {
        CacheConfig::Memory => "memory",
        CacheConfig::Sqlite { .. } => "sqlite",
    }
}

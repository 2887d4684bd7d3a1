//! Outbox configuration
//!
//! Loaded from (in order of priority):
//! 1. JSON file (~/.config/mail-viewer/outbox.json)
//! 2. Runtime environment variables
//! 3. Built-in defaults

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheConfig, DEFAULT_CACHE_ALIAS, LockSettings};
use crate::storage::ATTACHMENT_DIR;

/// Settings filename in the mail viewer config directory
pub const SETTINGS_FILE: &str = "outbox.json";

/// Database filename in the mail viewer data directory
const DATABASE_FILE: &str = "outbox.sqlite3";

const ENV_BACKEND: &str = "MAILVIEWER_BACKEND";
const ENV_CACHE: &str = "MAILVIEWER_CACHE";
const ENV_DATABASE: &str = "MAILVIEWER_DATABASE";
const ENV_ATTACHMENTS: &str = "MAILVIEWER_ATTACHMENTS";

/// Which outbox store to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local list
    #[default]
    Memory,
    /// Shared cache with a locked key index
    Cache,
    /// SQLite rows, one per MIME part
    Database,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "locmem" => Ok(BackendKind::Memory),
            "cache" => Ok(BackendKind::Cache),
            "database" | "db" | "sqlite" => Ok(BackendKind::Database),
            other => bail!("Unknown outbox backend '{}' (expected memory, cache or database)", other),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Memory => "memory",
            BackendKind::Cache => "cache",
            BackendKind::Database => "database",
        })
    }
}

/// Everything needed to open an outbox store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxSettings {
    pub backend: BackendKind,
    /// Which entry of `caches` the cache backend uses
    pub cache_alias: String,
    pub caches: HashMap<String, CacheConfig>,
    /// SQLite file for the database backend, defaults under the data directory
    pub database_path: Option<PathBuf>,
    /// Attachment directory for the database backend, defaults under the data directory
    pub attachments_dir: Option<PathBuf>,
    pub lock: LockSettings,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            cache_alias: DEFAULT_CACHE_ALIAS.to_string(),
            caches: HashMap::new(),
            database_path: None,
            attachments_dir: None,
            lock: LockSettings::default(),
        }
    }
}

impl OutboxSettings {
    /// Load settings using the following priority:
    /// 1. JSON file (~/.config/mail-viewer/outbox.json)
    /// 2. Runtime environment variables over the defaults
    pub fn load() -> Result<Self> {
        if config::config_exists(SETTINGS_FILE) {
            return config::load_json(SETTINGS_FILE);
        }

        Self::from_env()
    }

    /// Load settings from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse outbox settings JSON")
    }

    /// Write these settings to ~/.config/mail-viewer/outbox.json
    pub fn save(&self) -> Result<PathBuf> {
        config::save_json(SETTINGS_FILE, self)
    }

    /// Write these settings to a specific JSON file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        config::save_json_file(path, self)
    }

    /// Defaults overridden by `MAILVIEWER_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(backend) = lookup(ENV_BACKEND) {
            settings.backend = backend
                .parse()
                .with_context(|| format!("Invalid {}", ENV_BACKEND))?;
        }
        if let Some(alias) = lookup(ENV_CACHE) {
            settings.cache_alias = alias;
        }
        if let Some(path) = lookup(ENV_DATABASE) {
            settings.database_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(ENV_ATTACHMENTS) {
            settings.attachments_dir = Some(PathBuf::from(path));
        }

        Ok(settings)
    }

    /// The configured database path, or `outbox.sqlite3` in the data directory
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => data_path(DATABASE_FILE),
        }
    }

    /// The configured attachment directory, or `mailviewer_attachments` in the data directory
    pub fn attachments_dir(&self) -> Result<PathBuf> {
        match &self.attachments_dir {
            Some(path) => Ok(path.clone()),
            None => data_path(ATTACHMENT_DIR),
        }
    }

    /// Whether the selected store disappears with the process
    ///
    /// True for the memory backend, and for the cache backend when its alias
    /// resolves to an in-memory cache, including the one used when no caches
    /// are configured at all.
    pub fn is_process_local(&self) -> bool {
        match self.backend {
            BackendKind::Memory => true,
            BackendKind::Cache => match self.caches.get(&self.cache_alias) {
                Some(config) => matches!(config, CacheConfig::Memory),
                None => self.caches.is_empty(),
            },
            BackendKind::Database => false,
        }
    }
}

fn data_path(name: &str) -> Result<PathBuf> {
    config::data_path(name).context("Could not determine data directory")
}

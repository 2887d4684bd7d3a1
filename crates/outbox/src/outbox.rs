//! Outbox facade
//!
//! The entry point for senders and viewers. Holds one configured store and
//! forwards to it.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use crate::cache::Caches;
use crate::models::{Attachment, Email, MessageId, StoredMessage};
use crate::settings::{BackendKind, OutboxSettings};
use crate::storage::{CacheOutbox, FileAttachmentStore, InMemoryOutbox, OutboxStore, SqliteOutbox};

pub struct Outbox {
    store: Arc<dyn OutboxStore>,
}

impl Outbox {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }

    /// Open the store named by `settings`
    pub fn from_settings(settings: &OutboxSettings) -> Result<Self> {
        Ok(Self::new(open_store(settings)?))
    }

    pub fn store(&self) -> &Arc<dyn OutboxStore> {
        &self.store
    }

    /// Record sent messages, returning how many were stored
    pub fn send(&self, messages: &[Email]) -> Result<usize> {
        self.store.store(messages)
    }

    pub fn get_message(&self, id: &MessageId) -> Result<Option<StoredMessage>> {
        self.store.get(id)
    }

    /// Every stored message, oldest first
    pub fn get_outbox(&self) -> Result<Vec<StoredMessage>> {
        self.store.list_all()
    }

    pub fn delete_message(&self, id: &MessageId) -> Result<()> {
        self.store.delete(id)
    }

    pub fn attachment_payload(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        self.store.attachment_payload(attachment)
    }
}

/// Build the store for the configured backend
pub fn open_store(settings: &OutboxSettings) -> Result<Arc<dyn OutboxStore>> {
    info!("[STORE] Opening {} outbox", settings.backend);

    let store: Arc<dyn OutboxStore> = match settings.backend {
        BackendKind::Memory => Arc::new(InMemoryOutbox::new()),
        BackendKind::Cache => {
            let caches = Caches::from_settings(&settings.caches)?;
            let cache = caches.get(&settings.cache_alias)?;
            Arc::new(CacheOutbox::with_lock_settings(cache, &settings.lock))
        }
        BackendKind::Database => {
            let db_path = settings.database_path()?;
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory {:?}", parent))?;
            }
            let attachments = FileAttachmentStore::new(settings.attachments_dir()?)?;
            Arc::new(SqliteOutbox::new(&db_path, Box::new(attachments))?)
        }
    };

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::error::OutboxError;
    use crate::testing::{ICON_GIF, multipart_email, plain_email};

    fn settings_for(backend: BackendKind, dir: &tempfile::TempDir) -> OutboxSettings {
        OutboxSettings {
            backend,
            database_path: Some(dir.path().join("outbox.sqlite3")),
            attachments_dir: Some(dir.path().join("attachments")),
            ..OutboxSettings::default()
        }
    }

    #[test]
    fn test_facade_on_every_backend() {
        for backend in [BackendKind::Memory, BackendKind::Cache, BackendKind::Database] {
            let dir = tempfile::tempdir().unwrap();
            let outbox = Outbox::from_settings(&settings_for(backend, &dir)).unwrap();

            let plain = plain_email("plain@localhost", "Plain");
            let multi = multipart_email("multi@localhost");
            assert_eq!(outbox.send(&[plain.clone(), multi.clone()]).unwrap(), 2, "{}", backend);

            let listed = outbox.get_outbox().unwrap();
            assert_eq!(listed.len(), 2, "{}", backend);
            assert_eq!(listed[0].message_id, *plain.message_id(), "{}", backend);

            let stored = outbox.get_message(multi.message_id()).unwrap().unwrap();
            let attachment = stored.attachments().next().unwrap();
            assert_eq!(outbox.attachment_payload(attachment).unwrap(), ICON_GIF, "{}", backend);

            outbox.delete_message(plain.message_id()).unwrap();
            assert!(outbox.get_message(plain.message_id()).unwrap().is_none(), "{}", backend);
            let err = outbox.delete_message(plain.message_id()).unwrap_err();
            assert!(OutboxError::is_not_found(&err), "{}", backend);
        }
    }

    #[test]
    fn test_unknown_cache_alias() {
        let settings = OutboxSettings {
            backend: BackendKind::Cache,
            cache_alias: "missing".to_string(),
            ..OutboxSettings::default()
        };
        assert!(Outbox::from_settings(&settings).is_err());
    }

    #[test]
    fn test_named_sqlite_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = OutboxSettings {
            backend: BackendKind::Cache,
            cache_alias: "shared".to_string(),
            ..OutboxSettings::default()
        };
        settings.caches.insert(
            "shared".to_string(),
            CacheConfig::Sqlite {
                path: dir.path().join("cache.sqlite3"),
            },
        );

        // Two facades over the same file see each other's messages
        let writer = Outbox::from_settings(&settings).unwrap();
        let reader = Outbox::from_settings(&settings).unwrap();
        writer.send(&[plain_email("a@localhost", "A")]).unwrap();

        let listed = reader.get_outbox().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].subject(), "A");
    }
}

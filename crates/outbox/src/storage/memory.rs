//! In-memory storage implementation
//!
//! Keeps sent messages for the lifetime of the store object. Used in tests
//! and single-process development where nothing needs to outlive the run.

use anyhow::Result;
use log::info;
use std::sync::RwLock;

use super::OutboxStore;
use crate::error::OutboxError;
use crate::models::{Email, MessageId, StoredMessage};

/// In-memory implementation of OutboxStore
///
/// An ordered list behind a RwLock, so several test threads can send and
/// read through one store.
pub struct InMemoryOutbox {
    messages: RwLock<Vec<Email>>,
}

impl InMemoryOutbox {
    /// Create a new empty outbox
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every message
    pub fn clear(&self) {
        self.messages.write().unwrap().clear();
    }
}

impl Default for InMemoryOutbox {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboxStore for InMemoryOutbox {
    fn store(&self, messages: &[Email]) -> Result<usize> {
        let mut outbox = self.messages.write().unwrap();
        outbox.extend(messages.iter().cloned());
        info!("[STORE] Stored {} message(s) in memory", messages.len());
        Ok(messages.len())
    }

    fn get(&self, id: &MessageId) -> Result<Option<StoredMessage>> {
        let outbox = self.messages.read().unwrap();
        Ok(outbox
            .iter()
            .find(|email| email.message_id() == id)
            .map(StoredMessage::from_email))
    }

    fn list_all(&self) -> Result<Vec<StoredMessage>> {
        let outbox = self.messages.read().unwrap();
        Ok(outbox.iter().map(StoredMessage::from_email).collect())
    }

    fn delete(&self, id: &MessageId) -> Result<()> {
        let mut outbox = self.messages.write().unwrap();
        let position = outbox
            .iter()
            .position(|email| email.message_id() == id)
            .ok_or_else(|| OutboxError::NotFound(id.clone()))?;
        outbox.remove(position);
        info!("[STORE] Deleted {} from memory", id);
        Ok(())
    }
}

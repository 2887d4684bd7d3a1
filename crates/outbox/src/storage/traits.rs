//! Storage trait definitions

use anyhow::{Result, bail};

use crate::models::{Attachment, AttachmentPayload, Email, MessageId, StoredMessage};

/// Trait for outbox storage operations
///
/// This trait abstracts over the storage backends (in-process list, shared
/// cache, relational rows). Every variant hands back the same read model so
/// callers never need to know which one is configured.
pub trait OutboxStore: Send + Sync {
    /// Persist a batch of sent messages, returning how many were stored
    ///
    /// A message lost to lock contention is logged and left out of the
    /// count while the rest of the batch goes through; storage failures
    /// abort the call.
    fn store(&self, messages: &[Email]) -> Result<usize>;

    /// Get a message by its `Message-ID` (exact match)
    fn get(&self, id: &MessageId) -> Result<Option<StoredMessage>>;

    /// Every stored message, oldest first
    fn list_all(&self) -> Result<Vec<StoredMessage>>;

    /// Delete one message
    ///
    /// Fails with [`crate::OutboxError::NotFound`] if nothing is stored under `id`.
    fn delete(&self, id: &MessageId) -> Result<()>;

    /// Resolve an attachment's bytes
    fn attachment_payload(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        match &attachment.payload {
            AttachmentPayload::Inline(data) => Ok(data.clone()),
            AttachmentPayload::Stored(reference) => {
                bail!("This store cannot resolve attachment reference {:?}", reference)
            }
        }
    }
}

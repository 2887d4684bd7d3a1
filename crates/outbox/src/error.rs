//! Typed outbox failures
//!
//! Stores return `anyhow::Result`; callers that need to branch on one of
//! these recover it with `downcast_ref::<OutboxError>()`.

use crate::models::MessageId;

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    /// No message is stored under this id
    #[error("Message {0} not found in outbox")]
    NotFound(MessageId),

    /// The shared index names this id but its entry is gone
    #[error("Message {0} is listed in the index but its content is missing")]
    IndexCorrupted(MessageId),

    /// Every acquisition attempt found the lock held
    #[error("Could not acquire lock '{key}' after {attempts} attempts")]
    LockExhausted { key: String, attempts: u32 },
}

impl OutboxError {
    /// Whether `err` is an [`OutboxError::NotFound`]
    pub fn is_not_found(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<OutboxError>(), Some(OutboxError::NotFound(_)))
    }

    /// Whether `err` is an [`OutboxError::LockExhausted`]
    pub fn is_lock_exhausted(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<OutboxError>(),
            Some(OutboxError::LockExhausted { .. })
        )
    }
}

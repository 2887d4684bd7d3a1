//! Outbox crate - Capture outgoing email for development and testing
//!
//! This crate provides:
//! - The outgoing message model and its stored read model
//! - MIME decomposition of a message into one entry per part
//! - Three interchangeable outbox stores (memory, shared cache, SQLite)
//! - A cache-key lock guarding the shared cache's message index
//! - The [`Outbox`] facade and settings to pick a store
//!
//! Messages are looked up by their `Message-ID` header, exactly as written.

pub mod cache;
pub mod error;
pub mod mime;
pub mod models;
pub mod outbox;
pub mod settings;
pub mod storage;

#[cfg(test)]
mod testing;

pub use cache::{
    Cache, CacheConfig, Caches, DEFAULT_CACHE_ALIAS, InMemoryCache, IndexLock, LockGuard,
    LockSettings, ReleaseOutcome, SqliteCache,
};
pub use error::OutboxError;
pub use mime::{AttachmentData, DecomposedPart, decode_header_value, decompose};
pub use models::{
    Attachment, AttachmentPayload, Email, EmailError, Headers, MessageId, MessagePart,
    StoredMessage,
};
pub use outbox::{Outbox, open_store};
pub use settings::{BackendKind, OutboxSettings, SETTINGS_FILE};
pub use storage::{
    ATTACHMENT_DIR, AttachmentStore, CacheOutbox, FileAttachmentStore, INDEX_KEY, INDEX_LOCK_KEY,
    InMemoryOutbox, OutboxStore, SqliteOutbox,
};

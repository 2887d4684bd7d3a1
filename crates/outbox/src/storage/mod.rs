//! Storage traits and implementations
//!
//! Three interchangeable outbox backends behind [`OutboxStore`]: a
//! process-local list, a shared cache with a locked key index, and SQLite
//! rows with attachments on disk.

mod attachments;
mod attachments_file;
mod memory;
mod shared_cache;
mod sqlite;
mod traits;

pub use attachments::{ATTACHMENT_DIR, AttachmentStore};
pub use attachments_file::FileAttachmentStore;
pub use memory::InMemoryOutbox;
pub use shared_cache::{CacheOutbox, INDEX_KEY, INDEX_LOCK_KEY};
pub use sqlite::SqliteOutbox;
pub use traits::OutboxStore;

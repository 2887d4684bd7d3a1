//! Attachment storage trait for decoded attachment payloads

use anyhow::Result;

/// Directory name attachments are kept under, relative to the storage root
pub const ATTACHMENT_DIR: &str = "mailviewer_attachments";

/// Trait for attachment storage operations
///
/// A payload is saved under a name derived from its filename; the returned
/// reference is what the relational rows hold. Implementations handle
/// compression internally.
pub trait AttachmentStore: Send + Sync {
    /// Store a payload, returning its reference
    ///
    /// Never overwrites: a second `icon.gif` gets a distinct reference.
    fn save(&self, filename: &str, data: &[u8]) -> Result<String>;

    /// Retrieve a payload, `None` if the reference doesn't exist
    fn open(&self, reference: &str) -> Result<Option<Vec<u8>>>;

    /// Check if a reference exists
    fn exists(&self, reference: &str) -> Result<bool>;

    /// Delete a payload; deleting a missing reference is not an error
    fn delete(&self, reference: &str) -> Result<()>;

    /// Remove every payload
    fn clear(&self) -> Result<()>;
}

//! Domain models for outbox entities

mod email;
mod headers;
mod stored;

pub use email::{Email, EmailError, MessageId};
pub use headers::Headers;
pub use stored::{Attachment, AttachmentPayload, MessagePart, StoredMessage};

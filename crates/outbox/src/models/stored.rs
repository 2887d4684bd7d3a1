//! Read model returned by every outbox store

use serde::{Deserialize, Serialize};

use super::{Email, Headers, MessageId};
use crate::mime::{DecomposedPart, decompose};

/// Where an attachment's bytes live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentPayload {
    /// Decoded bytes carried with the message
    Inline(Vec<u8>),
    /// Reference into an attachment store, resolved on demand
    Stored(String),
}

/// A file attached to a message part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub payload: AttachmentPayload,
}

impl Attachment {
    /// Storage reference, if the payload lives outside the message
    pub fn reference(&self) -> Option<&str> {
        match &self.payload {
            AttachmentPayload::Stored(reference) => Some(reference.as_str()),
            AttachmentPayload::Inline(_) => None,
        }
    }
}

/// One MIME part of a stored message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    pub content_type: String,
    pub headers: Headers,
    /// Decoded text for `text/plain` and `text/html` parts, empty otherwise
    pub content: String,
    pub attachment: Option<Attachment>,
}

impl MessagePart {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type.starts_with("multipart/")
    }

    pub fn filename(&self) -> Option<&str> {
        self.attachment.as_ref().map(|a| a.filename.as_str())
    }
}

impl From<DecomposedPart> for MessagePart {
    fn from(part: DecomposedPart) -> Self {
        Self {
            content_type: part.content_type,
            headers: part.headers,
            content: part.content,
            attachment: part.attachment.map(|a| Attachment {
                filename: a.filename,
                payload: AttachmentPayload::Inline(a.data),
            }),
        }
    }
}

/// A message as held by an outbox store
///
/// The root part carries the message-level headers; `parts` holds every
/// other part in pre-order, each a direct child of the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message_id: MessageId,
    pub root: MessagePart,
    pub parts: Vec<MessagePart>,
}

impl StoredMessage {
    /// Build the read model straight from an outgoing message
    pub fn from_email(email: &Email) -> Self {
        let mut parts = decompose(email).into_iter().map(MessagePart::from);
        let root = parts.next().unwrap_or_else(|| MessagePart {
            content_type: email.content_type(),
            headers: email.headers().clone(),
            content: String::new(),
            attachment: None,
        });

        Self {
            message_id: email.message_id().clone(),
            root,
            parts: parts.collect(),
        }
    }

    /// Look up a message-level header, ignoring case
    pub fn get(&self, name: &str) -> Option<&str> {
        self.root.get(name)
    }

    /// Look up a message-level header with encoded words decoded
    pub fn decoded(&self, name: &str) -> Option<String> {
        self.root.headers.decoded(name)
    }

    pub fn subject(&self) -> String {
        self.decoded("subject").unwrap_or_default()
    }

    pub fn content_type(&self) -> &str {
        &self.root.content_type
    }

    pub fn is_multipart(&self) -> bool {
        self.root.is_multipart()
    }

    /// The root followed by every other part
    pub fn walk(&self) -> impl Iterator<Item = &MessagePart> {
        std::iter::once(&self.root).chain(self.parts.iter())
    }

    /// First inline `text/plain` content
    pub fn text_body(&self) -> Option<&str> {
        self.body_of("text/plain")
    }

    /// First inline `text/html` content
    pub fn html_body(&self) -> Option<&str> {
        self.body_of("text/html")
    }

    pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.walk().filter_map(|part| part.attachment.as_ref())
    }

    fn body_of(&self, content_type: &str) -> Option<&str> {
        self.walk()
            .find(|part| part.content_type == content_type && part.attachment.is_none())
            .map(|part| part.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ICON_GIF, multipart_email, plain_email};

    #[test]
    fn test_plain_message() {
        let stored = StoredMessage::from_email(&plain_email("p@localhost", "Plain"));
        assert_eq!(stored.message_id.as_str(), "<p@localhost>");
        assert_eq!(stored.subject(), "Plain");
        assert!(!stored.is_multipart());
        assert!(stored.parts.is_empty());
        assert_eq!(stored.text_body().map(str::trim_end), Some("Email text"));
        assert_eq!(stored.html_body(), None);
    }

    #[test]
    fn test_multipart_message() {
        let stored = StoredMessage::from_email(&multipart_email("m@localhost"));
        assert_eq!(stored.content_type(), "multipart/mixed");
        assert_eq!(stored.walk().count(), 5);
        assert!(stored.html_body().unwrap().contains("Email html"));

        let attachments: Vec<_> = stored.attachments().collect();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "icon.gif");
        assert_eq!(attachments[0].payload, AttachmentPayload::Inline(ICON_GIF.to_vec()));
        assert_eq!(attachments[0].reference(), None);
    }
}

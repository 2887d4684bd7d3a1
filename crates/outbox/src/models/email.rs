//! Outgoing email model
//!
//! An [`Email`] is the raw RFC 5322 representation of a sent message,
//! together with its top-level headers parsed once at construction.

use std::fmt;

use mail_parser::MessageParser;
use serde::{Deserialize, Serialize};

use super::Headers;
use crate::mime::collect_headers;

/// Unique identifier for a message (the `Message-ID` header value)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id without its surrounding angle brackets, as used in URLs
    pub fn bare(&self) -> &str {
        let id = self.0.trim();
        id.strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Errors raised while accepting a raw message into the outbox
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Message could not be parsed as RFC 5322")]
    Unparseable,
    #[error("Message has no Message-ID header")]
    MissingMessageId,
}

/// An outgoing email message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    raw: Vec<u8>,
    message_id: MessageId,
    headers: Headers,
}

impl Email {
    /// Accept a raw RFC 5322 message
    ///
    /// The message must carry a `Message-ID` header (matched case-insensitively);
    /// its value becomes the lookup key in every outbox store.
    pub fn from_raw(raw: impl Into<Vec<u8>>) -> Result<Self, EmailError> {
        let raw = raw.into();

        let headers = {
            let parsed = MessageParser::new()
                .parse(raw.as_slice())
                .ok_or(EmailError::Unparseable)?;
            let root = parsed.parts.first().ok_or(EmailError::Unparseable)?;
            collect_headers(root, &raw)
        };

        let message_id = headers
            .get("message-id")
            .filter(|id| !id.is_empty())
            .map(MessageId::new)
            .ok_or(EmailError::MissingMessageId)?;

        Ok(Self {
            raw,
            message_id,
            headers,
        })
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Top-level headers in the order they appear
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Look up a top-level header, ignoring case
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Decoded `Subject`, empty when absent
    pub fn subject(&self) -> String {
        self.headers.decoded("subject").unwrap_or_default()
    }

    pub fn content_type(&self) -> String {
        self.headers.content_type()
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type().starts_with("multipart/")
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{multipart_email, plain_email};

    #[test]
    fn test_message_id_bare() {
        assert_eq!(MessageId::new("<abc@localhost>").bare(), "abc@localhost");
        assert_eq!(MessageId::new("abc@localhost").bare(), "abc@localhost");
        assert_eq!(MessageId::new(" <x@y> ").bare(), "x@y");
    }

    #[test]
    fn test_from_raw_reads_message_id() {
        let email = plain_email("one@localhost", "Email subject");
        assert_eq!(email.message_id().as_str(), "<one@localhost>");
        assert_eq!(email.subject(), "Email subject");
        assert!(!email.is_multipart());
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let email = plain_email("one@localhost", "Email subject");
        assert_eq!(email.get("Subject"), email.get("SUBJECT"));
        assert_eq!(email.get("message-id"), Some("<one@localhost>"));
        assert!(email.get("from").unwrap().contains("test@example.com"));
    }

    #[test]
    fn test_multipart_content_type() {
        let email = multipart_email("two@localhost");
        assert!(email.is_multipart());
        assert_eq!(email.content_type(), "multipart/mixed");
    }

    #[test]
    fn test_missing_message_id() {
        let raw = b"From: a@localhost\r\nSubject: hi\r\n\r\nbody\r\n".to_vec();
        let err = Email::from_raw(raw).unwrap_err();
        assert!(matches!(err, EmailError::MissingMessageId));
    }

    #[test]
    fn test_message_id_header_case() {
        let raw = b"message-id: <lower@localhost>\r\nSubject: hi\r\n\r\nbody\r\n".to_vec();
        let email = Email::from_raw(raw).unwrap();
        assert_eq!(email.message_id().as_str(), "<lower@localhost>");
    }
}

//! MIME decomposition
//!
//! Splits a possibly-multipart [`Email`] into a flat, pre-ordered list of
//! parts suitable for one-row-per-part relational storage. The first part is
//! the root and carries the message-level headers; every later part is
//! linked directly to the root, so nested containers such as
//! `multipart/alternative` become siblings of the leaves they hold.

use log::debug;
use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};

use crate::models::{Email, Headers};

/// Content type assumed when a part doesn't declare one (RFC 2045 §5.2)
pub(crate) const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Decoded attachment payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentData {
    pub filename: String,
    pub data: Vec<u8>,
}

/// One part produced by [`decompose`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecomposedPart {
    /// Index of the parent part in the decomposition, `None` for the root
    pub parent: Option<usize>,
    /// Message-level id on the root, the part's own `Message-ID` (usually empty) elsewhere
    pub message_id: String,
    pub content_type: String,
    pub headers: Headers,
    /// Decoded text for `text/plain` and `text/html`, empty otherwise
    pub content: String,
    pub attachment: Option<AttachmentData>,
}

impl DecomposedPart {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Filename used when an attachment doesn't name itself
const UNNAMED_ATTACHMENT: &str = "attachment";

/// Walk `email` depth-first and produce one entry per MIME part
///
/// Inline `message/rfc822` parts are followed into: the forwarded message's
/// parts come right after their container, still linked to the root. An
/// encapsulated message sent as an attachment is kept whole instead.
///
/// Never fails: undecodable text falls back to lossy UTF-8 and a message the
/// parser rejects yields a single root holding the already-known headers.
pub fn decompose(email: &Email) -> Vec<DecomposedPart> {
    let Some(parsed) = MessageParser::new().parse(email.raw()) else {
        debug!("[MIME] Parser rejected {}, storing headers only", email.message_id());
        return vec![DecomposedPart {
            parent: None,
            message_id: email.message_id().to_string(),
            content_type: email.content_type(),
            headers: email.headers().clone(),
            content: String::new(),
            attachment: None,
        }];
    };

    let mut parts = Vec::with_capacity(parsed.parts.len());
    push_parts(&parsed, &mut parts);

    if let Some(root) = parts.first_mut() {
        root.parent = None;
        root.message_id = email.message_id().to_string();
    }
    parts
}

fn push_parts(message: &Message<'_>, out: &mut Vec<DecomposedPart>) {
    let raw = message.raw_message();

    for part in &message.parts {
        let decomposed = decompose_part(part, raw);
        let inline_message = match &part.body {
            PartType::Message(inner) if decomposed.attachment.is_none() => Some(inner),
            _ => None,
        };
        out.push(decomposed);

        if let Some(inner) = inline_message {
            debug!("[MIME] Following inline message with {} part(s)", inner.parts.len());
            push_parts(inner, out);
        }
    }
}

fn decompose_part(part: &MessagePart<'_>, raw: &[u8]) -> DecomposedPart {
    let headers = collect_headers(part, raw);
    let content_type = mime_type(part);

    let (content, attachment) = if is_attachment(part) {
        let filename = part
            .attachment_name()
            .filter(|name| !name.is_empty())
            .unwrap_or(UNNAMED_ATTACHMENT)
            .to_string();
        let data = attachment_bytes(part, raw);
        (String::new(), Some(AttachmentData { filename, data }))
    } else if content_type == "text/plain" || content_type == "text/html" {
        (text_content(part), None)
    } else {
        (String::new(), None)
    };

    DecomposedPart {
        parent: Some(0),
        message_id: headers.get("message-id").unwrap_or_default().to_string(),
        content_type,
        headers,
        content,
        attachment,
    }
}

/// Decoded text of a text part
///
/// The parser has already applied the transfer encoding and the declared
/// charset (lossy on unknown charsets or bad bytes).
fn text_content(part: &MessagePart<'_>) -> String {
    match &part.body {
        PartType::Text(text) | PartType::Html(text) => text.to_string(),
        _ => String::from_utf8_lossy(part.contents()).into_owned(),
    }
}

/// Transfer-decoded payload; encapsulated messages are kept as sent
fn attachment_bytes(part: &MessagePart<'_>, raw: &[u8]) -> Vec<u8> {
    match &part.body {
        PartType::Message(_) => raw
            .get(part.raw_body_offset()..part.raw_end_offset())
            .unwrap_or_default()
            .to_vec(),
        _ => part.contents().to_vec(),
    }
}

/// `type/subtype` from the parsed `Content-Type`, lowercased
pub(crate) fn mime_type<'x>(headers: &impl MimeHeaders<'x>) -> String {
    let Some(content_type) = headers.content_type() else {
        return DEFAULT_CONTENT_TYPE.to_string();
    };
    if content_type.ctype().is_empty() {
        return DEFAULT_CONTENT_TYPE.to_string();
    }

    match content_type.subtype() {
        Some(subtype) => format!("{}/{}", content_type.ctype(), subtype),
        None => content_type.ctype().to_string(),
    }
    .to_ascii_lowercase()
}

pub(crate) fn is_attachment<'x>(headers: &impl MimeHeaders<'x>) -> bool {
    headers
        .content_disposition()
        .is_some_and(|disposition| disposition.is_attachment())
}

/// Parse stored headers back into a header-only message
///
/// Lets structured lookups (content type, disposition, filename) go through
/// the same decoding as freshly parsed mail.
pub(crate) fn parse_headers(headers: &Headers) -> Option<Message<'static>> {
    if headers.is_empty() {
        return None;
    }

    let mut block = String::new();
    for (name, value) in headers.iter() {
        block.push_str(name);
        block.push_str(": ");
        block.push_str(value);
        block.push_str("\r\n");
    }
    block.push_str("\r\n");

    MessageParser::new()
        .parse_headers(block.as_bytes())
        .map(Message::into_owned)
}

/// Decode RFC 2047 encoded words in an unstructured header value
///
/// Values without encoded words come back unchanged apart from unfolding.
pub fn decode_header_value(value: &str) -> String {
    let block = format!("Subject: {}\r\n\r\n", value);
    MessageParser::new()
        .parse_headers(block.as_bytes())
        .and_then(|parsed| parsed.subject().map(str::to_string))
        .unwrap_or_else(|| value.to_string())
}

/// Headers of one part exactly as written, in order, duplicates included
///
/// Names and values are sliced from the raw message so custom capitalization
/// and encoded words survive storage; folded values are unfolded onto one line.
pub(crate) fn collect_headers(part: &MessagePart<'_>, raw: &[u8]) -> Headers {
    part.headers
        .iter()
        .filter_map(|header| {
            let field = raw.get(header.offset_field..header.offset_start)?;
            let value = raw.get(header.offset_start..header.offset_end)?;

            let name = String::from_utf8_lossy(field);
            let name = name.trim().trim_end_matches(':').trim_end();
            if name.is_empty() {
                return None;
            }

            Some((name.to_string(), unfold(&String::from_utf8_lossy(value))))
        })
        .collect()
}

fn unfold(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoredMessage;
    use crate::testing::{HTML_BODY, ICON_GIF, accented_email, multipart_email, plain_email};

    #[test]
    fn test_unfold() {
        assert_eq!(unfold(" a@example.com,\r\n b@example.com\r\n"), "a@example.com, b@example.com");
        assert_eq!(unfold(" single\r\n"), "single");
    }

    #[test]
    fn test_plain_message_is_single_root() {
        let email = plain_email("plain@localhost", "Email subject");
        let parts = decompose(&email);

        assert_eq!(parts.len(), 1);
        let root = &parts[0];
        assert!(root.is_root());
        assert_eq!(root.message_id, "<plain@localhost>");
        assert_eq!(root.content_type, "text/plain");
        assert_eq!(root.content.trim_end(), "Email text");
        assert_eq!(root.headers.get("Subject"), Some("Email subject"));
        assert!(root.headers.get("From").unwrap().contains("test@example.com"));
        let to = root.headers.get("To").unwrap();
        assert!(to.contains("to1@example.com") && to.contains("to2@example.com"));
        assert!(root.attachment.is_none());
    }

    #[test]
    fn test_multipart_with_attachment() {
        let email = multipart_email("multi@localhost");
        let parts = decompose(&email);

        let types: Vec<_> = parts.iter().map(|p| p.content_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "multipart/mixed",
                "multipart/alternative",
                "text/plain",
                "text/html",
                "image/gif"
            ]
        );

        let root = &parts[0];
        assert_eq!(root.parent, None);
        assert_eq!(root.message_id, "<multi@localhost>");
        assert_eq!(root.content, "");
        assert_eq!(root.headers.get("subject"), Some("Email subject"));
        assert!(root.attachment.is_none());

        for part in &parts[1..] {
            assert_eq!(part.parent, Some(0));
            assert_eq!(part.message_id, "");
            assert!(part.headers.get("Subject").is_none());
        }

        assert_eq!(parts[1].content, "");
        assert!(parts[1].attachment.is_none());

        assert_eq!(parts[2].content.trim_end(), "Email text");
        assert!(parts[2].attachment.is_none());

        assert_eq!(parts[3].content.trim_end(), HTML_BODY);
        assert!(parts[3].attachment.is_none());

        let gif = &parts[4];
        assert_eq!(gif.content, "");
        let attachment = gif.attachment.as_ref().unwrap();
        assert_eq!(attachment.filename, "icon.gif");
        assert_eq!(attachment.data, ICON_GIF);
    }

    #[test]
    fn test_bad_charset_degrades() {
        let raw = concat!(
            "Message-ID: <latin@localhost>\r\n",
            "Subject: charset\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: text/plain; charset=\"x-no-such-charset\"\r\n",
            "\r\n",
            "caf\u{e9} ok\r\n"
        );
        let email = Email::from_raw(raw.as_bytes().to_vec()).unwrap();
        let parts = decompose(&email);

        assert_eq!(parts.len(), 1);
        assert!(parts[0].content.contains("ok"));
    }

    #[test]
    fn test_duplicate_headers_kept() {
        let raw = concat!(
            "Message-ID: <dup@localhost>\r\n",
            "X-Tag: one\r\n",
            "X-Tag: two\r\n",
            "\r\n",
            "body\r\n"
        );
        let email = Email::from_raw(raw.as_bytes().to_vec()).unwrap();
        let parts = decompose(&email);

        let tags: Vec<_> = parts[0].headers.get_all("x-tag").collect();
        assert_eq!(tags, vec!["one", "two"]);
    }

    #[test]
    fn test_encoded_words_decoded() {
        let email = accented_email("accent@localhost");
        assert_eq!(email.subject(), "Café résumé");

        let parts = decompose(&email);
        let attachment = parts
            .iter()
            .find_map(|p| p.attachment.as_ref())
            .unwrap();
        assert_eq!(attachment.filename, "résumé.pdf");
        assert_eq!(attachment.data, b"%PDF-1.4");

        let stored = StoredMessage::from_email(&email);
        assert_eq!(stored.subject(), "Café résumé");
        // Raw header values are stored untouched
        assert!(stored.get("subject").unwrap().starts_with("=?"));
    }

    #[test]
    fn test_quoted_semicolon_in_filename() {
        let raw = concat!(
            "Message-ID: <semi@localhost>\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=\"b1\"\r\n",
            "\r\n",
            "--b1\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "see attached\r\n",
            "--b1\r\n",
            "Content-Type: text/plain; name=\"a;b.txt\"\r\n",
            "Content-Disposition: attachment; filename=\"a;b.txt\"\r\n",
            "\r\n",
            "payload\r\n",
            "--b1--\r\n"
        );
        let email = Email::from_raw(raw.as_bytes().to_vec()).unwrap();
        let parts = decompose(&email);

        let attachment = parts[2].attachment.as_ref().unwrap();
        assert_eq!(attachment.filename, "a;b.txt");
        assert_eq!(parts[2].headers.filename().as_deref(), Some("a;b.txt"));
    }

    #[test]
    fn test_inline_forwarded_message_is_followed() {
        let raw = concat!(
            "Message-ID: <outer@localhost>\r\n",
            "Subject: Fwd: hello\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=\"outer\"\r\n",
            "\r\n",
            "--outer\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "See below\r\n",
            "--outer\r\n",
            "Content-Type: message/rfc822\r\n",
            "\r\n",
            "Message-ID: <inner@localhost>\r\n",
            "Subject: hello\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "Inner body\r\n",
            "--outer--\r\n"
        );
        let email = Email::from_raw(raw.as_bytes().to_vec()).unwrap();
        let parts = decompose(&email);

        let types: Vec<_> = parts.iter().map(|p| p.content_type.as_str()).collect();
        assert_eq!(
            types,
            vec!["multipart/mixed", "text/plain", "message/rfc822", "text/plain"]
        );
        assert_eq!(parts[0].message_id, "<outer@localhost>");
        assert!(parts[1..].iter().all(|p| p.parent == Some(0)));

        let inner = &parts[3];
        assert_eq!(inner.message_id, "<inner@localhost>");
        assert_eq!(inner.headers.get("Subject"), Some("hello"));
        assert_eq!(inner.content.trim_end(), "Inner body");
        assert!(inner.attachment.is_none());
    }

    #[test]
    fn test_attached_message_kept_whole() {
        let raw = concat!(
            "Message-ID: <outer@localhost>\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=\"outer\"\r\n",
            "\r\n",
            "--outer\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "See attached\r\n",
            "--outer\r\n",
            "Content-Type: message/rfc822\r\n",
            "Content-Disposition: attachment; filename=\"original.eml\"\r\n",
            "\r\n",
            "Message-ID: <inner@localhost>\r\n",
            "Subject: hello\r\n",
            "\r\n",
            "Inner body\r\n",
            "--outer--\r\n"
        );
        let email = Email::from_raw(raw.as_bytes().to_vec()).unwrap();
        let parts = decompose(&email);

        assert_eq!(parts.len(), 3);
        let attachment = parts[2].attachment.as_ref().unwrap();
        assert_eq!(attachment.filename, "original.eml");
        let eml = String::from_utf8_lossy(&attachment.data);
        assert!(eml.contains("Message-ID: <inner@localhost>"));
        assert!(eml.contains("Inner body"));
    }
}

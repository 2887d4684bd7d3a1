//! Message fixtures shared by unit tests

use mail_builder::MessageBuilder;

use crate::models::Email;

/// 1x1 transparent GIF
pub const ICON_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xff, 0xff,
    0xff, 0x00, 0x00, 0x00, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

pub const HTML_BODY: &str =
    r#"<html><body><p style="background-color: #AABBFF; color: white">Email html</p></body></html>"#;

/// Single-part `text/plain` message
pub fn plain_email(id: &str, subject: &str) -> Email {
    let raw = MessageBuilder::new()
        .message_id(id)
        .from("test@example.com")
        .to(vec!["to1@example.com", "to2@example.com"])
        .subject(subject)
        .text_body("Email text")
        .write_to_vec()
        .unwrap();
    Email::from_raw(raw).unwrap()
}

/// `multipart/mixed` holding text + HTML alternatives and a GIF attachment
pub fn multipart_email(id: &str) -> Email {
    let raw = MessageBuilder::new()
        .message_id(id)
        .from("test@example.com")
        .to(vec!["to1@example.com", "to2@example.com"])
        .subject("Email subject")
        .text_body("Email text")
        .html_body(HTML_BODY)
        .attachment("image/gif", "icon.gif", ICON_GIF)
        .write_to_vec()
        .unwrap();
    Email::from_raw(raw).unwrap()
}

/// Non-ASCII subject and attachment name, written as encoded words
pub fn accented_email(id: &str) -> Email {
    let raw = MessageBuilder::new()
        .message_id(id)
        .from("test@example.com")
        .to("to1@example.com")
        .subject("Café résumé")
        .text_body("Email text")
        .attachment("application/pdf", "résumé.pdf", &b"%PDF-1.4"[..])
        .write_to_vec()
        .unwrap();
    Email::from_raw(raw).unwrap()
}

//! Subcommand implementations

use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use log::{info, warn};
use mail_builder::MessageBuilder;
use outbox::{Email, MessageId, Outbox, OutboxSettings, StoredMessage, decode_header_value};

use crate::args::Commands;

const TEST_SUBJECT: &str = "Subject here";
const TEST_FROM: &str = "test@example.com";
const TEST_TEXT: &str = "The message in text/plain";
const TEST_HTML: &str = r#"<html><body><p style="background-color: #AABBFF; color: white">The message as text/html</p></body></html>"#;

pub fn execute(settings: &OutboxSettings, settings_path: Option<&Path>, command: Commands) -> Result<()> {
    let open = || -> Result<Outbox> {
        if settings.is_process_local() {
            warn!(
                "The {} outbox lives in this process only: messages are gone when this command exits",
                settings.backend
            );
        }
        Outbox::from_settings(settings)
    };

    match command {
        Commands::SendTest {
            to,
            attachment,
            count,
        } => send_test(&open()?, &to, attachment.as_deref(), count),
        Commands::List { json } => list(&open()?, json),
        Commands::Show { message_id, json } => show(&open()?, &message_id, json),
        Commands::Delete { message_id } => delete(&open()?, &message_id),
        Commands::Settings { save } => print_settings(settings, save, settings_path),
    }
}

/// Print the effective settings, optionally persisting them
fn print_settings(settings: &OutboxSettings, save: bool, path: Option<&Path>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(settings)?);

    if save {
        let written = match path {
            Some(path) => {
                settings.save_to(path)?;
                path.to_path_buf()
            }
            None => settings.save()?,
        };
        info!("Saved settings to {}", written.display());
    }
    Ok(())
}

/// Compose the standard text + HTML test email
fn compose_test_email(to: &str, attachment: Option<(&str, &[u8])>, seq: usize) -> Result<Email> {
    let message_id = format!(
        "{}.{}@mailviewer.localhost",
        Utc::now().timestamp_micros(),
        seq
    );

    let mut builder = MessageBuilder::new()
        .message_id(message_id)
        .from(TEST_FROM)
        .to(to)
        .subject(TEST_SUBJECT)
        .text_body(TEST_TEXT)
        .html_body(TEST_HTML);

    if let Some((filename, data)) = attachment {
        builder = builder.attachment("application/octet-stream", filename.to_string(), data.to_vec());
    }

    let raw = builder.write_to_vec().context("Failed to compose test email")?;
    Ok(Email::from_raw(raw)?)
}

fn send_test(outbox: &Outbox, to: &str, attachment: Option<&Path>, count: usize) -> Result<()> {
    let attachment = match attachment {
        Some(path) => {
            let data = std::fs::read(path)
                .with_context(|| format!("Cannot read attachment '{}'", path.display()))?;
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".to_string());
            Some((filename, data))
        }
        None => None,
    };

    let emails = (0..count)
        .map(|seq| {
            compose_test_email(
                to,
                attachment
                    .as_ref()
                    .map(|(name, data)| (name.as_str(), data.as_slice())),
                seq,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    let sent = outbox.send(&emails)?;
    if sent < emails.len() {
        warn!("Only {} of {} test emails were stored", sent, emails.len());
    }

    for email in &emails {
        if outbox.get_message(email.message_id())?.is_some() {
            println!("{}", email.message_id());
        }
    }
    info!("Sent {} test email(s)", sent);
    Ok(())
}

fn list(outbox: &Outbox, json: bool) -> Result<()> {
    let messages = outbox.get_outbox()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!("Outbox is empty");
        return Ok(());
    }

    for message in &messages {
        println!(
            "{}\t{}\t{}\t{}",
            message.message_id,
            message.decoded("to").unwrap_or_default(),
            message.subject(),
            message.content_type()
        );
    }
    Ok(())
}

fn show(outbox: &Outbox, message_id: &str, json: bool) -> Result<()> {
    let Some(message) = lookup(outbox, message_id)? else {
        bail!("No message {} in the outbox", message_id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&message)?);
        return Ok(());
    }

    for (name, value) in message.root.headers.iter() {
        println!("{}: {}", name, decode_header_value(value));
    }

    if let Some(text) = message.text_body() {
        println!("\n--- text/plain ---\n{}", text.trim_end());
    }
    if let Some(html) = message.html_body() {
        println!("\n--- text/html ---\n{}", html.trim_end());
    }

    for attachment in message.attachments() {
        let size = outbox.attachment_payload(attachment)?.len();
        println!("\n[attachment] {} ({} bytes)", attachment.filename, size);
    }
    Ok(())
}

fn delete(outbox: &Outbox, message_id: &str) -> Result<()> {
    let id = resolve_id(outbox, message_id)?;
    outbox.delete_message(&id)?;
    println!("Deleted {}", id);
    Ok(())
}

/// Look a message up as typed, then with angle brackets added
fn lookup(outbox: &Outbox, message_id: &str) -> Result<Option<StoredMessage>> {
    for candidate in candidates(message_id) {
        if let Some(message) = outbox.get_message(&candidate)? {
            return Ok(Some(message));
        }
    }
    Ok(None)
}

fn resolve_id(outbox: &Outbox, message_id: &str) -> Result<MessageId> {
    Ok(lookup(outbox, message_id)?
        .map(|message| message.message_id)
        .unwrap_or_else(|| MessageId::new(message_id)))
}

fn candidates(message_id: &str) -> Vec<MessageId> {
    let id = MessageId::new(message_id.trim());
    let bracketed = MessageId::new(format!("<{}>", id.bare()));
    if bracketed == id {
        vec![id]
    } else {
        vec![id, bracketed]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox::InMemoryOutbox;
    use std::sync::Arc;

    fn memory_outbox() -> Outbox {
        Outbox::new(Arc::new(InMemoryOutbox::new()))
    }

    #[test]
    fn test_compose_test_email() {
        let email = compose_test_email("dev@example.com", None, 0).unwrap();
        assert_eq!(email.subject(), TEST_SUBJECT);
        assert!(email.message_id().as_str().ends_with(".0@mailviewer.localhost>"));
        assert_eq!(email.content_type(), "multipart/alternative");
    }

    #[test]
    fn test_compose_with_attachment() {
        let email = compose_test_email("dev@example.com", Some(("notes.txt", &b"hi"[..])), 1).unwrap();
        assert_eq!(email.content_type(), "multipart/mixed");

        let stored = StoredMessage::from_email(&email);
        let attachment = stored.attachments().next().unwrap();
        assert_eq!(attachment.filename, "notes.txt");
    }

    #[test]
    fn test_send_show_delete() {
        let outbox = memory_outbox();
        send_test(&outbox, "dev@example.com", None, 2).unwrap();

        let messages = outbox.get_outbox().unwrap();
        assert_eq!(messages.len(), 2);
        assert_ne!(messages[0].message_id, messages[1].message_id);

        let id = messages[0].message_id.clone();
        show(&outbox, id.bare(), false).unwrap();

        delete(&outbox, id.bare()).unwrap();
        assert_eq!(outbox.get_outbox().unwrap().len(), 1);
        assert!(delete(&outbox, id.bare()).is_err());
    }

    #[test]
    fn test_show_missing() {
        assert!(show(&memory_outbox(), "missing@localhost", false).is_err());
    }

    #[test]
    fn test_settings_save_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.json");
        let current = OutboxSettings::default();

        print_settings(&current, true, Some(&path)).unwrap();
        assert_eq!(OutboxSettings::from_file(&path).unwrap(), current);
    }

    #[test]
    fn test_candidates() {
        assert_eq!(
            candidates("a@b"),
            vec![MessageId::new("a@b"), MessageId::new("<a@b>")]
        );
        assert_eq!(candidates("<a@b>"), vec![MessageId::new("<a@b>")]);
    }
}

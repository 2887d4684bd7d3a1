//! SQLite-based outbox storage with file storage for attachments
//!
//! Every MIME part of a message is one row of `email_messages`. The root row
//! holds the `Message-ID` and the message-level headers; the other parts
//! point at it through `parent_id`, and deleting the root cascades to them.
//! Attachment payloads live in an [`AttachmentStore`] and rows keep only the
//! reference.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use log::{debug, info, warn};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use rusqlite_migration::{M, Migrations};

use super::OutboxStore;
use super::attachments::AttachmentStore;
use crate::error::OutboxError;
use crate::mime::{DecomposedPart, decompose};
use crate::models::{
    Attachment, AttachmentPayload, Email, Headers, MessageId, MessagePart, StoredMessage,
};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- One row per MIME part; sub-parts point at their root
            CREATE TABLE email_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                parent_id INTEGER REFERENCES email_messages(id) ON DELETE CASCADE,
                message_id TEXT NOT NULL DEFAULT '',
                message_headers TEXT NOT NULL DEFAULT '[]',  -- JSON [[name, value], ...]
                content TEXT NOT NULL DEFAULT '',
                file_attachment TEXT,  -- AttachmentStore reference
                content_type TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX idx_email_messages_parent_id ON email_messages(parent_id);
            CREATE INDEX idx_email_messages_message_id ON email_messages(message_id);
            "#,
        ),
    ])
}

const PART_COLUMNS: &str =
    "id, parent_id, message_id, message_headers, content, file_attachment, content_type";

/// One `email_messages` row
struct PartRow {
    id: i64,
    parent_id: Option<i64>,
    message_id: String,
    headers_json: String,
    content: String,
    file_attachment: Option<String>,
    content_type: String,
}

impl PartRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            message_id: row.get(2)?,
            headers_json: row.get(3)?,
            content: row.get(4)?,
            file_attachment: row.get(5)?,
            content_type: row.get(6)?,
        })
    }

    /// Convert to the read model, leaving attachment payloads on disk
    fn into_part(self) -> Result<MessagePart> {
        let headers = Headers::from_json(&self.headers_json)
            .with_context(|| format!("Row {} has unreadable headers", self.id))?;

        let attachment = self.file_attachment.map(|reference| Attachment {
            filename: headers.filename().unwrap_or_else(|| reference.clone()),
            payload: AttachmentPayload::Stored(reference),
        });

        Ok(MessagePart {
            content_type: self.content_type,
            headers,
            content: self.content,
            attachment,
        })
    }
}

/// SQLite-based outbox storage
///
/// Uses SQLite for the part tree and an AttachmentStore for attachment
/// payloads.
pub struct SqliteOutbox {
    conn: Mutex<Connection>,
    attachments: Box<dyn AttachmentStore>,
}

impl SqliteOutbox {
    /// Create a new SQLite outbox
    ///
    /// - `db_path`: Path to the SQLite database file
    /// - `attachments`: Storage for attachment payloads
    pub fn new(db_path: impl AsRef<Path>, attachments: Box<dyn AttachmentStore>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        // foreign_keys is off by default in SQLite and ON DELETE CASCADE needs it
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
            attachments,
        })
    }

    /// Insert every part of one message, saving attachments as they come
    ///
    /// `saved` collects attachment references so the caller can remove them
    /// if the transaction doesn't commit.
    fn insert_parts(
        &self,
        tx: &Transaction<'_>,
        parts: &[DecomposedPart],
        saved: &mut Vec<String>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut row_ids: Vec<i64> = Vec::with_capacity(parts.len());

        let mut stmt = tx.prepare(
            "INSERT INTO email_messages
             (parent_id, message_id, message_headers, content, file_attachment,
              content_type, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )?;

        for part in parts {
            let parent_id = part
                .parent
                .map(|index| {
                    row_ids
                        .get(index)
                        .copied()
                        .ok_or_else(|| anyhow!("Part parent {} not inserted yet", index))
                })
                .transpose()?;

            let file_attachment = match &part.attachment {
                Some(attachment) => {
                    let reference = self
                        .attachments
                        .save(&attachment.filename, &attachment.data)
                        .with_context(|| format!("Failed to save attachment {:?}", attachment.filename))?;
                    saved.push(reference.clone());
                    Some(reference)
                }
                None => None,
            };

            let row_id = stmt.insert(params![
                parent_id,
                part.message_id,
                part.headers.to_json()?,
                part.content,
                file_attachment,
                part.content_type,
                now,
                now,
            ])?;
            row_ids.push(row_id);
        }

        Ok(())
    }

    fn load_root(conn: &Connection, id: &MessageId) -> Result<Option<PartRow>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM email_messages
                     WHERE parent_id IS NULL AND message_id = ?
                     ORDER BY id LIMIT 1",
                    PART_COLUMNS
                ),
                [id.as_str()],
                PartRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn load_children(conn: &Connection, parent_id: i64) -> Result<Vec<PartRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM email_messages WHERE parent_id = ? ORDER BY id",
            PART_COLUMNS
        ))?;
        let rows = stmt
            .query_map([parent_id], PartRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn assemble(root: PartRow, children: Vec<PartRow>) -> Result<StoredMessage> {
        let message_id = MessageId::new(root.message_id.clone());
        let parts = children
            .into_iter()
            .map(PartRow::into_part)
            .collect::<Result<Vec<_>>>()?;

        Ok(StoredMessage {
            message_id,
            root: root.into_part()?,
            parts,
        })
    }

    /// Remove attachment files, logging rather than failing
    fn discard_attachments(&self, references: &[String]) {
        for reference in references {
            if let Err(e) = self.attachments.delete(reference) {
                warn!("[STORE] Failed to delete attachment {}: {:#}", reference, e);
            }
        }
    }
}

impl OutboxStore for SqliteOutbox {
    fn store(&self, messages: &[Email]) -> Result<usize> {
        let mut stored = 0;

        for email in messages {
            let parts = decompose(email);
            let mut saved = Vec::new();

            let result = {
                let mut conn = self.conn.lock().unwrap();
                conn.transaction()
                    .map_err(anyhow::Error::from)
                    .and_then(|tx| {
                        self.insert_parts(&tx, &parts, &mut saved)?;
                        tx.commit()?;
                        Ok(())
                    })
            };

            if let Err(e) = result {
                self.discard_attachments(&saved);
                return Err(e).with_context(|| format!("Failed to store {}", email.message_id()));
            }

            debug!(
                "[STORE] Stored {} as {} row(s)",
                email.message_id(),
                parts.len()
            );
            stored += 1;
        }

        info!("[STORE] Stored {} message(s) in database", stored);
        Ok(stored)
    }

    fn get(&self, id: &MessageId) -> Result<Option<StoredMessage>> {
        let conn = self.conn.lock().unwrap();

        let Some(root) = Self::load_root(&conn, id)? else {
            return Ok(None);
        };
        let children = Self::load_children(&conn, root.id)?;

        Self::assemble(root, children).map(Some)
    }

    fn list_all(&self) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();

        let roots = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM email_messages WHERE parent_id IS NULL ORDER BY id",
                PART_COLUMNS
            ))?;
            stmt.query_map([], PartRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };

        // All sub-parts in one query, grouped by their root
        let mut children: HashMap<i64, Vec<PartRow>> = HashMap::new();
        {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM email_messages WHERE parent_id IS NOT NULL ORDER BY id",
                PART_COLUMNS
            ))?;
            for row in stmt.query_map([], PartRow::from_row)? {
                let row = row?;
                if let Some(parent_id) = row.parent_id {
                    children.entry(parent_id).or_default().push(row);
                }
            }
        }

        roots
            .into_iter()
            .map(|root| {
                let parts = children.remove(&root.id).unwrap_or_default();
                Self::assemble(root, parts)
            })
            .collect()
    }

    fn delete(&self, id: &MessageId) -> Result<()> {
        let references = {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;

            let root_id = Self::load_root(&tx, id)?
                .map(|root| root.id)
                .ok_or_else(|| OutboxError::NotFound(id.clone()))?;

            // Attachment references anywhere under the root
            let references = {
                let mut stmt = tx.prepare(
                    "WITH RECURSIVE tree(id) AS (
                        SELECT ?1
                        UNION ALL
                        SELECT e.id FROM email_messages e JOIN tree ON e.parent_id = tree.id
                     )
                     SELECT file_attachment FROM email_messages
                     WHERE id IN tree AND file_attachment IS NOT NULL",
                )?;
                stmt.query_map([root_id], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };

            // Cascades to every sub-part
            tx.execute("DELETE FROM email_messages WHERE id = ?", [root_id])?;
            tx.commit()?;
            references
        };

        self.discard_attachments(&references);
        info!("[STORE] Deleted {} from database", id);
        Ok(())
    }

    fn attachment_payload(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        match &attachment.payload {
            AttachmentPayload::Inline(data) => Ok(data.clone()),
            AttachmentPayload::Stored(reference) => self
                .attachments
                .open(reference)?
                .ok_or_else(|| anyhow!("Attachment file {:?} is missing", reference)),
        }
    }
}

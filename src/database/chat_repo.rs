// Chat repository
// Append-only, strictly ordered message history per persona

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};

use crate::error::StorageError;

use super::models::{ChatMessage, ChatRole};
use super::DatabaseManager;

impl DatabaseManager {
    /// Append a chat message
    ///
    /// The message must carry the next sequence id for its persona; gaps and
    /// duplicates are rejected so history stays strictly ordered.
    pub fn append_chat_message(&self, message: &ChatMessage) -> Result<(), StorageError> {
        self.with_connection(|conn| append_chat_message_impl(conn, message))
    }

    /// Get all chat messages for a persona, ordered by sequence id
    pub fn list_chat_messages(&self, persona_id: &str) -> Result<Vec<ChatMessage>, StorageError> {
        self.with_connection(|conn| list_chat_messages_impl(conn, persona_id))
    }

    /// Get the next sequence id for a persona's chat
    pub fn next_chat_sequence_id(&self, persona_id: &str) -> Result<i64, StorageError> {
        self.with_connection(|conn| next_chat_sequence_id_impl(conn, persona_id))
    }

    /// Delete all chat messages for a persona
    pub fn clear_chat_messages(&self, persona_id: &str) -> Result<(), StorageError> {
        self.with_connection(|conn| clear_chat_messages_impl(conn, persona_id))
    }
}

fn append_chat_message_impl(conn: &Connection, message: &ChatMessage) -> Result<()> {
    let expected = next_chat_sequence_id_impl(conn, &message.persona_id)?;
    if message.sequence_id != expected {
        bail!(
            "Out-of-order chat message for persona {}: got sequence {}, expected {}",
            message.persona_id,
            message.sequence_id,
            expected
        );
    }

    conn.execute(
        r#"
        INSERT INTO chat_messages (id, persona_id, role, content, sequence_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            message.id,
            message.persona_id,
            message.role.as_str(),
            message.content,
            message.sequence_id,
            message.created_at,
        ],
    )
    .context("Failed to append chat message")?;

    Ok(())
}

fn list_chat_messages_impl(conn: &Connection, persona_id: &str) -> Result<Vec<ChatMessage>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, persona_id, role, content, sequence_id, created_at \
             FROM chat_messages WHERE persona_id = ? ORDER BY sequence_id ASC",
        )
        .context("Failed to prepare list_chat_messages query")?;

    let messages = stmt
        .query_map(params![persona_id], |row| {
            Ok(ChatMessage {
                id: row.get(0)?,
                persona_id: row.get(1)?,
                role: ChatRole::from_str(&row.get::<_, String>(2)?),
                content: row.get(3)?,
                sequence_id: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .context("Failed to query chat messages")?;

    messages
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect chat messages")
}

fn next_chat_sequence_id_impl(conn: &Connection, persona_id: &str) -> Result<i64> {
    let max_seq: Option<i64> = conn
        .query_row(
            "SELECT MAX(sequence_id) FROM chat_messages WHERE persona_id = ?",
            params![persona_id],
            |row| row.get(0),
        )
        .context("Failed to get max sequence_id")?;

    Ok(max_seq.unwrap_or(0) + 1)
}

fn clear_chat_messages_impl(conn: &Connection, persona_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM chat_messages WHERE persona_id = ?",
        params![persona_id],
    )
    .context("Failed to clear chat messages")?;

    Ok(())
}

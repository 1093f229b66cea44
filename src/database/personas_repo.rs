// Personas repository
// Upsert semantics: one live persona per transcription

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::error::StorageError;

use super::models::PersonaProfile;
use super::DatabaseManager;

impl DatabaseManager {
    /// Store a persona for a transcription, replacing any previous one
    ///
    /// Replacement deletes the old row, which cascades away its chat history;
    /// a regenerated system prompt invalidates prior conversational context.
    pub fn upsert_persona(&self, profile: &PersonaProfile) -> Result<(), StorageError> {
        self.with_connection(|conn| upsert_persona_impl(conn, profile))
    }

    /// Get a persona by id
    pub fn get_persona(&self, persona_id: &str) -> Result<Option<PersonaProfile>, StorageError> {
        self.with_connection(|conn| get_persona_impl(conn, persona_id))
    }

    /// Get the live persona for a transcription, if any
    pub fn get_persona_by_transcription(
        &self,
        transcription_id: &str,
    ) -> Result<Option<PersonaProfile>, StorageError> {
        self.with_connection(|conn| get_by_transcription_impl(conn, transcription_id))
    }
}

fn upsert_persona_impl(conn: &Connection, profile: &PersonaProfile) -> Result<()> {
    let tx = conn
        .unchecked_transaction()
        .context("Failed to begin transaction")?;

    let replaced = tx
        .execute(
            "DELETE FROM personas WHERE transcription_id = ?",
            params![profile.transcription_id],
        )
        .context("Failed to clear previous persona")?;

    tx.execute(
        r#"
        INSERT INTO personas (
            id, transcription_id, name, description, system_prompt,
            model_used, transcript_truncated, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            profile.id,
            profile.transcription_id,
            profile.name,
            profile.description,
            profile.system_prompt,
            profile.model_used,
            profile.transcript_truncated,
            profile.created_at,
        ],
    )
    .context("Failed to insert persona")?;

    tx.commit().context("Failed to commit persona upsert")?;

    if replaced > 0 {
        log::info!(
            "Replaced persona for transcription {} (chat history cleared)",
            profile.transcription_id
        );
    }
    Ok(())
}

fn row_to_persona(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersonaProfile> {
    Ok(PersonaProfile {
        id: row.get(0)?,
        transcription_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        system_prompt: row.get(4)?,
        model_used: row.get(5)?,
        transcript_truncated: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const PERSONA_COLUMNS: &str = "id, transcription_id, name, description, system_prompt, \
     model_used, transcript_truncated, created_at";

fn get_persona_impl(conn: &Connection, persona_id: &str) -> Result<Option<PersonaProfile>> {
    let sql = format!("SELECT {} FROM personas WHERE id = ?", PERSONA_COLUMNS);
    let result = conn.query_row(&sql, params![persona_id], row_to_persona);

    match result {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get persona"),
    }
}

fn get_by_transcription_impl(
    conn: &Connection,
    transcription_id: &str,
) -> Result<Option<PersonaProfile>> {
    let sql = format!(
        "SELECT {} FROM personas WHERE transcription_id = ?",
        PERSONA_COLUMNS
    );
    let result = conn.query_row(&sql, params![transcription_id], row_to_persona);

    match result {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get persona by transcription"),
    }
}

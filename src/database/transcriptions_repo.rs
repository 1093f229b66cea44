// Transcriptions repository
// Row lifecycle for transcriptions and their segments

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};

use crate::error::StorageError;

use super::models::{Segment, Transcription, TranscriptionStatus};
use super::DatabaseManager;

impl DatabaseManager {
    /// Insert a new transcription row (normally in `pending` state)
    pub fn create_transcription(&self, tx: &Transcription) -> Result<(), StorageError> {
        self.with_connection(|conn| create_transcription_impl(conn, tx))
    }

    /// Get a transcription by id
    pub fn get_transcription(&self, id: &str) -> Result<Option<Transcription>, StorageError> {
        self.with_connection(|conn| get_transcription_impl(conn, id))
    }

    /// List a client's transcriptions, newest first
    pub fn list_client_transcriptions(
        &self,
        client_id: &str,
    ) -> Result<Vec<Transcription>, StorageError> {
        self.with_connection(|conn| list_client_transcriptions_impl(conn, client_id))
    }

    /// Find the most recent failed attempt for a client + source file
    pub fn find_failed_transcription(
        &self,
        client_id: &str,
        source_filename: &str,
    ) -> Result<Option<Transcription>, StorageError> {
        self.with_connection(|conn| find_failed_impl(conn, client_id, source_filename))
    }

    /// Move a transcription to a new status
    ///
    /// Only forward transitions are accepted; anything else is a storage
    /// error, keeping the pending -> processing -> terminal invariant in one
    /// place.
    pub fn update_transcription_status(
        &self,
        id: &str,
        status: TranscriptionStatus,
        error_message: Option<&str>,
    ) -> Result<(), StorageError> {
        self.with_connection(|conn| update_status_impl(conn, id, status, error_message))
    }

    /// Persist a finished transcript: text, optional translation, segments,
    /// and the `completed` status, atomically
    pub fn complete_transcription(
        &self,
        id: &str,
        raw_text: &str,
        translated_text: Option<&str>,
        language: Option<&str>,
        segments: &[Segment],
    ) -> Result<(), StorageError> {
        self.with_connection(|conn| {
            complete_transcription_impl(conn, id, raw_text, translated_text, language, segments)
        })
    }

    /// Update the translation of a completed transcription
    ///
    /// Completed rows are immutable except for translation updates.
    pub fn set_translation(
        &self,
        id: &str,
        translated_text: &str,
        language: &str,
    ) -> Result<(), StorageError> {
        self.with_connection(|conn| set_translation_impl(conn, id, translated_text, language))
    }

    /// Delete a transcription (cascades to segments, persona and chat)
    pub fn delete_transcription(&self, id: &str) -> Result<(), StorageError> {
        self.with_connection(|conn| delete_transcription_impl(conn, id))
    }

    /// Get the ordered segments of a transcription
    pub fn get_segments(&self, transcription_id: &str) -> Result<Vec<Segment>, StorageError> {
        self.with_connection(|conn| get_segments_impl(conn, transcription_id))
    }
}

fn create_transcription_impl(conn: &Connection, tx: &Transcription) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO transcriptions (
            id, client_id, source_filename, raw_text, translated_text,
            language, has_timestamps, status, error_message, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            tx.id,
            tx.client_id,
            tx.source_filename,
            tx.raw_text,
            tx.translated_text,
            tx.language,
            tx.has_timestamps,
            tx.status.as_str(),
            tx.error_message,
            tx.created_at,
        ],
    )
    .context("Failed to create transcription")?;

    Ok(())
}

fn row_to_transcription(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transcription> {
    Ok(Transcription {
        id: row.get(0)?,
        client_id: row.get(1)?,
        source_filename: row.get(2)?,
        raw_text: row.get(3)?,
        translated_text: row.get(4)?,
        language: row.get(5)?,
        has_timestamps: row.get(6)?,
        status: TranscriptionStatus::from_str(&row.get::<_, String>(7)?),
        error_message: row.get(8)?,
        created_at: row.get(9)?,
    })
}

const TRANSCRIPTION_COLUMNS: &str = "id, client_id, source_filename, raw_text, translated_text, \
     language, has_timestamps, status, error_message, created_at";

fn get_transcription_impl(conn: &Connection, id: &str) -> Result<Option<Transcription>> {
    let sql = format!("SELECT {} FROM transcriptions WHERE id = ?", TRANSCRIPTION_COLUMNS);
    let result = conn.query_row(&sql, params![id], row_to_transcription);

    match result {
        Ok(tx) => Ok(Some(tx)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get transcription"),
    }
}

fn list_client_transcriptions_impl(conn: &Connection, client_id: &str) -> Result<Vec<Transcription>> {
    let sql = format!(
        "SELECT {} FROM transcriptions WHERE client_id = ? ORDER BY created_at DESC",
        TRANSCRIPTION_COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .context("Failed to prepare list_client_transcriptions query")?;

    let rows = stmt
        .query_map(params![client_id], row_to_transcription)
        .context("Failed to query transcriptions")?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect transcriptions")
}

fn find_failed_impl(
    conn: &Connection,
    client_id: &str,
    source_filename: &str,
) -> Result<Option<Transcription>> {
    let sql = format!(
        "SELECT {} FROM transcriptions \
         WHERE client_id = ? AND source_filename = ? AND status = 'failed' \
         ORDER BY created_at DESC LIMIT 1",
        TRANSCRIPTION_COLUMNS
    );
    let result = conn.query_row(&sql, params![client_id, source_filename], row_to_transcription);

    match result {
        Ok(tx) => Ok(Some(tx)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to find failed transcription"),
    }
}

fn update_status_impl(
    conn: &Connection,
    id: &str,
    status: TranscriptionStatus,
    error_message: Option<&str>,
) -> Result<()> {
    let current = get_transcription_impl(conn, id)?
        .with_context(|| format!("No transcription with id {}", id))?;

    if !current.status.can_transition_to(status) {
        bail!(
            "Illegal status transition for {}: {} -> {}",
            id,
            current.status.as_str(),
            status.as_str()
        );
    }

    conn.execute(
        "UPDATE transcriptions SET status = ?, error_message = ? WHERE id = ?",
        params![status.as_str(), error_message, id],
    )
    .context("Failed to update transcription status")?;

    log::debug!("Transcription {} -> {}", id, status.as_str());
    Ok(())
}

fn complete_transcription_impl(
    conn: &Connection,
    id: &str,
    raw_text: &str,
    translated_text: Option<&str>,
    language: Option<&str>,
    segments: &[Segment],
) -> Result<()> {
    let current = get_transcription_impl(conn, id)?
        .with_context(|| format!("No transcription with id {}", id))?;

    if !current
        .status
        .can_transition_to(TranscriptionStatus::Completed)
    {
        bail!(
            "Illegal status transition for {}: {} -> completed",
            id,
            current.status.as_str()
        );
    }

    let tx = conn
        .unchecked_transaction()
        .context("Failed to begin transaction")?;

    tx.execute(
        r#"
        UPDATE transcriptions
        SET raw_text = ?, translated_text = ?, language = ?,
            has_timestamps = ?, status = 'completed', error_message = NULL
        WHERE id = ?
        "#,
        params![raw_text, translated_text, language, !segments.is_empty(), id],
    )
    .context("Failed to store transcription result")?;

    for segment in segments {
        tx.execute(
            r#"
            INSERT INTO transcript_segments (id, transcription_id, start_time, end_time, text, sequence_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                segment.id,
                segment.transcription_id,
                segment.start_time,
                segment.end_time,
                segment.text,
                segment.sequence_id,
            ],
        )
        .context("Failed to insert transcript segment")?;
    }

    tx.commit().context("Failed to commit transcription result")?;
    Ok(())
}

fn set_translation_impl(
    conn: &Connection,
    id: &str,
    translated_text: &str,
    language: &str,
) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE transcriptions SET translated_text = ?, language = ? \
             WHERE id = ? AND status = 'completed'",
            params![translated_text, language, id],
        )
        .context("Failed to set translation")?;

    if updated == 0 {
        bail!("No completed transcription with id {}", id);
    }
    Ok(())
}

fn delete_transcription_impl(conn: &Connection, id: &str) -> Result<()> {
    let deleted = conn
        .execute("DELETE FROM transcriptions WHERE id = ?", params![id])
        .context("Failed to delete transcription")?;

    if deleted == 0 {
        bail!("No transcription with id {}", id);
    }
    Ok(())
}

fn get_segments_impl(conn: &Connection, transcription_id: &str) -> Result<Vec<Segment>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, transcription_id, start_time, end_time, text, sequence_id \
             FROM transcript_segments WHERE transcription_id = ? ORDER BY sequence_id ASC",
        )
        .context("Failed to prepare get_segments query")?;

    let rows = stmt
        .query_map(params![transcription_id], |row| {
            Ok(Segment {
                id: row.get(0)?,
                transcription_id: row.get(1)?,
                start_time: row.get(2)?,
                end_time: row.get(3)?,
                text: row.get(4)?,
                sequence_id: row.get(5)?,
            })
        })
        .context("Failed to query segments")?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect segments")
}

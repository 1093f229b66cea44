// Record store: SQLite-backed persistence for clients, transcriptions,
// personas and chat history

mod chat_repo;
mod clients_repo;
mod manager;
mod migrations;
pub mod models;
mod personas_repo;
mod transcriptions_repo;

pub use manager::DatabaseManager;
pub use models::{ChatMessage, ChatRole, Client, PersonaProfile, Segment, Transcription, TranscriptionStatus};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascading_delete_leaves_no_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseManager::new(dir.path().join("test.db")).unwrap();

        let client = Client::new("Cascade", "cascade@example.com");
        db.create_client(&client).unwrap();

        let tx = Transcription::pending(&client.id, "a.mp4");
        db.create_transcription(&tx).unwrap();
        db.update_transcription_status(&tx.id, TranscriptionStatus::Processing, None)
            .unwrap();
        let segments = vec![Segment::new(&tx.id, 0.0, 1.0, "hello", 0)];
        db.complete_transcription(&tx.id, "hello", None, None, &segments)
            .unwrap();

        let persona = PersonaProfile::new(&tx.id, "P", "d", "prompt", "m", false);
        db.upsert_persona(&persona).unwrap();
        db.append_chat_message(&ChatMessage::user(&persona.id, "hi", 1))
            .unwrap();

        db.delete_client(&client.id).unwrap();

        assert!(db.get_transcription(&tx.id).unwrap().is_none());
        assert!(db.get_segments(&tx.id).unwrap().is_empty());
        assert!(db.get_persona(&persona.id).unwrap().is_none());
        assert!(db.list_chat_messages(&persona.id).unwrap().is_empty());

        // Row-level check: nothing dangling anywhere
        db.with_connection(|conn| {
            for table in ["transcriptions", "transcript_segments", "personas", "chat_messages"] {
                let count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {}", table),
                    [],
                    |row| row.get(0),
                )?;
                assert_eq!(count, 0, "orphan rows left in {}", table);
            }
            Ok(())
        })
        .unwrap();
    }
}

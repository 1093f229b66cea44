// Database models - Persona
use serde::{Deserialize, Serialize};

/// A synthesized conversational profile derived from a completed transcript
///
/// At most one live persona per transcription; regeneration replaces the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub id: String,
    pub transcription_id: String,
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    /// Model identifier that produced this profile
    pub model_used: String,
    /// Whether the transcript was truncated before synthesis
    pub transcript_truncated: bool,
    pub created_at: String,
}

impl PersonaProfile {
    pub fn new(
        transcription_id: &str,
        name: &str,
        description: &str,
        system_prompt: &str,
        model_used: &str,
        transcript_truncated: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            transcription_id: transcription_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            system_prompt: system_prompt.to_string(),
            model_used: model_used.to_string(),
            transcript_truncated,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// Database models - Chat
use serde::{Deserialize, Serialize};

/// Who authored a chat message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Persona,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Persona => "persona",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "persona" => ChatRole::Persona,
            _ => ChatRole::User,
        }
    }
}

/// A chat message in a persona conversation
///
/// Messages are append-only and strictly ordered by `sequence_id` per
/// persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub persona_id: String,
    pub role: ChatRole,
    pub content: String,
    pub sequence_id: i64,
    pub created_at: String,
}

impl ChatMessage {
    pub fn user(persona_id: &str, content: &str, sequence_id: i64) -> Self {
        Self::new(persona_id, ChatRole::User, content, sequence_id)
    }

    pub fn persona(persona_id: &str, content: &str, sequence_id: i64) -> Self {
        Self::new(persona_id, ChatRole::Persona, content, sequence_id)
    }

    fn new(persona_id: &str, role: ChatRole, content: &str, sequence_id: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            persona_id: persona_id.to_string(),
            role,
            content: content.to_string(),
            sequence_id,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// Database models - Transcription
use serde::{Deserialize, Serialize};

/// Lifecycle of a transcription row
///
/// Transitions only move forward: pending -> processing -> completed | failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TranscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptionStatus::Pending => "pending",
            TranscriptionStatus::Processing => "processing",
            TranscriptionStatus::Completed => "completed",
            TranscriptionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pending" => TranscriptionStatus::Pending,
            "processing" => TranscriptionStatus::Processing,
            "completed" => TranscriptionStatus::Completed,
            "failed" => TranscriptionStatus::Failed,
            _ => TranscriptionStatus::Failed,
        }
    }

    /// Whether moving to `next` is a legal forward transition
    pub fn can_transition_to(&self, next: TranscriptionStatus) -> bool {
        matches!(
            (self, next),
            (TranscriptionStatus::Pending, TranscriptionStatus::Processing)
                | (TranscriptionStatus::Processing, TranscriptionStatus::Completed)
                | (TranscriptionStatus::Processing, TranscriptionStatus::Failed)
        )
    }

    /// Completed and failed are terminal; nothing transitions out of them
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TranscriptionStatus::Completed | TranscriptionStatus::Failed
        )
    }
}

/// One transcription record, exactly one per processed file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub id: String,
    pub client_id: String,
    pub source_filename: String,
    pub raw_text: String,
    pub translated_text: Option<String>,
    /// Target language code when a translation was requested
    pub language: Option<String>,
    pub has_timestamps: bool,
    pub status: TranscriptionStatus,
    pub error_message: Option<String>,
    pub created_at: String,
}

impl Transcription {
    /// Create a fresh pending row for a file about to be processed
    pub fn pending(client_id: &str, source_filename: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            source_filename: source_filename.to_string(),
            raw_text: String::new(),
            translated_text: None,
            language: None,
            has_timestamps: false,
            status: TranscriptionStatus::Pending,
            error_message: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A time-aligned slice of a transcript
///
/// Ordered by `sequence_id`; the concatenation of segment texts equals the
/// transcription's `raw_text` modulo whitespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub transcription_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub sequence_id: i64,
}

impl Segment {
    pub fn new(
        transcription_id: &str,
        start_time: f64,
        end_time: f64,
        text: &str,
        sequence_id: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            transcription_id: transcription_id.to_string(),
            start_time,
            end_time,
            text: text.to_string(),
            sequence_id,
        }
    }
}

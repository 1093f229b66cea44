//! vidscribe: turn videos into transcripts, translations and chattable
//! personas.
//!
//! The pipeline extracts audio with ffmpeg, transcribes it through a local
//! speech-recognition service, optionally translates the transcript, and
//! persists everything in a SQLite record store per client. A completed
//! transcript can then be distilled into a persona profile that a local
//! language model answers as, with the full chat history stored alongside.

pub mod chat;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod llm_engine;
pub mod media;
pub mod persona;
pub mod pipeline;
pub mod transcription;
pub mod translation;

pub use chat::{ChatSessionManager, SessionState};
pub use config::{Config, GenerationOptions, RetryPolicy};
pub use database::DatabaseManager;
pub use error::{
    AudioExtractionError, ChatError, PersonaError, PipelineError, StageError, StorageError,
    TranscriptionError, TranslationError,
};
pub use persona::PersonaSynthesizer;
pub use pipeline::{
    BatchItem, BatchItemStatus, BatchProgress, BatchReport, Pipeline, ProcessOptions,
    ProgressCallback,
};
pub use transcription::{
    HttpTranscriptionBackend, TranscriptResult, TranscriptSegment, TranscriptionAdapter,
    TranscriptionBackend,
};
pub use translation::{HttpTranslationBackend, TranslationAdapter, TranslationBackend};

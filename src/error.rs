//! Error taxonomy for the transcription pipeline
//!
//! Adapter-level errors are caught at the pipeline boundary and converted to
//! a terminal `failed` status; storage errors are fatal to the current
//! operation and propagate unchanged.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while extracting audio from a video container
#[derive(Debug, Error)]
pub enum AudioExtractionError {
    #[error("unsupported container format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("source file not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("ffmpeg not found on PATH")]
    FfmpegMissing,

    #[error("ffmpeg failed on {}: {}", .path.display(), .detail)]
    FfmpegFailed { path: PathBuf, detail: String },

    #[error("extracted audio is empty for {}", .0.display())]
    EmptyOutput(PathBuf),

    #[error("failed to create temporary audio file: {0}")]
    TempFile(String),
}

/// Errors raised by the transcription backend or its adapter
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("transcription request failed: {0}")]
    RequestFailed(String),

    #[error("backend returned an empty transcript for {}", .0.display())]
    EmptyTranscript(PathBuf),
}

/// Errors raised by the translation backend or its adapter
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("translation of chunk {index} failed: {detail}")]
    ChunkFailed { index: usize, detail: String },

    #[error("invalid target language: {0}")]
    InvalidLanguage(String),
}

/// Errors raised during persona synthesis
#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("transcription {transcription_id} is not usable for persona synthesis: {reason}")]
    InsufficientInput {
        transcription_id: String,
        reason: String,
    },

    #[error("language model backend failed: {0}")]
    BackendFailure(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Record store failure, carrying the underlying cause
///
/// The database layer works in `anyhow` internally; this wrapper is the typed
/// boundary the rest of the crate sees.
#[derive(Debug, Error)]
#[error("storage error: {0}")]
pub struct StorageError(#[from] pub anyhow::Error);

/// Any single pipeline stage failure
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Audio(#[from] AudioExtractionError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("cannot read input: {0}")]
    Input(#[from] std::io::Error),
}

/// A stage failure tied to the file being processed
#[derive(Debug, Error)]
#[error("failed to process {}: {}", .path.display(), .source)]
pub struct PipelineError {
    pub path: PathBuf,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<StageError>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Errors surfaced by a chat turn
///
/// Backend failures here are recoverable: the session moves to an error state
/// and the caller may retry `send_message`.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("unknown persona: {0}")]
    UnknownPersona(String),

    #[error("a turn is already awaiting a response for persona {0}")]
    Busy(String),

    #[error("language model backend failed: {0}")]
    Backend(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

//! Transcription adapter
//!
//! Wraps the opaque speech-recognition service behind a typed contract and
//! normalizes its output. Fidelity of the recognition itself is the backend's
//! concern; this layer only cleans whitespace and shapes the result.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::error::TranscriptionError;

/// A time-aligned slice as reported by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

/// Normalized transcription output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub raw_text: String,
    /// Empty when timestamps were not requested
    pub segments: Vec<TranscriptSegment>,
}

/// The opaque speech-recognition function: audio path in, text out
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    async fn transcribe(
        &self,
        audio_path: &Path,
        want_timestamps: bool,
    ) -> Result<TranscriptResult, TranscriptionError>;
}

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());

/// Collapse whitespace runs and strip blank edge lines without touching words
pub fn normalize_text(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|l| WHITESPACE_RUN.replace_all(l.trim(), " ").into_owned())
        .collect();

    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.is_empty())
        .map(|i| i + 1)
        .unwrap_or(start);

    lines[start..end].join("\n")
}

/// Adapter in front of the transcription backend
pub struct TranscriptionAdapter {
    backend: Arc<dyn TranscriptionBackend>,
}

impl TranscriptionAdapter {
    pub fn new(backend: Arc<dyn TranscriptionBackend>) -> Self {
        Self { backend }
    }

    /// Transcribe an audio file, normalizing the backend output
    ///
    /// An empty transcript for a real audio file is an error, reported but
    /// never retried here: re-running a slow model call silently risks
    /// duplicate cost.
    pub async fn transcribe(
        &self,
        audio_path: &Path,
        want_timestamps: bool,
    ) -> Result<TranscriptResult, TranscriptionError> {
        let raw = self.backend.transcribe(audio_path, want_timestamps).await?;

        let segments: Vec<TranscriptSegment> = if want_timestamps {
            raw.segments
                .into_iter()
                .map(|s| TranscriptSegment {
                    start_time: s.start_time,
                    end_time: s.end_time,
                    text: normalize_text(&s.text),
                })
                .filter(|s| !s.text.is_empty())
                .collect()
        } else {
            Vec::new()
        };

        // When the backend gives segments, the joined segment text is the
        // transcript; otherwise use its flat text field.
        let raw_text = if !segments.is_empty() {
            segments
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            normalize_text(&raw.raw_text)
        };

        if raw_text.is_empty() {
            return Err(TranscriptionError::EmptyTranscript(
                audio_path.to_path_buf(),
            ));
        }

        Ok(TranscriptResult { raw_text, segments })
    }
}

/// Wire format of the speech-recognition HTTP service
#[derive(Debug, Deserialize)]
struct InferenceSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    text: String,
    #[serde(default)]
    segments: Vec<InferenceSegment>,
}

/// HTTP backend for a local whisper-style inference server
pub struct HttpTranscriptionBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranscriptionBackend {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl TranscriptionBackend for HttpTranscriptionBackend {
    async fn transcribe(
        &self,
        audio_path: &Path,
        want_timestamps: bool,
    ) -> Result<TranscriptResult, TranscriptionError> {
        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| TranscriptionError::RequestFailed(format!("cannot read audio: {}", e)))?;

        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| TranscriptionError::RequestFailed(e.to_string()))?;

        let form = multipart::Form::new()
            .part("file", part)
            .text(
                "response_format",
                if want_timestamps { "verbose_json" } else { "json" },
            );

        log::debug!(
            "Transcription request for {} (timestamps: {})",
            audio_path.display(),
            want_timestamps
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    TranscriptionError::BackendUnavailable(e.to_string())
                } else {
                    TranscriptionError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::RequestFailed(format!(
                "backend returned {}: {}",
                status, body
            )));
        }

        let parsed: InferenceResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::RequestFailed(format!("invalid response: {}", e)))?;

        Ok(TranscriptResult {
            raw_text: parsed.text,
            segments: parsed
                .segments
                .into_iter()
                .map(|s| TranscriptSegment {
                    start_time: s.start,
                    end_time: s.end,
                    text: s.text,
                })
                .collect(),
        })
    }
}

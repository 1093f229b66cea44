//! Pipeline orchestrator
//!
//! Drives one file through extract, transcribe, optionally translate, and
//! persist, and runs batches of files with per-item failure isolation. Every
//! `process_one` call resolves its row to a terminal status; a row is never
//! left in `processing` when the call returns.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::database::models::{Segment, Transcription, TranscriptionStatus};
use crate::database::DatabaseManager;
use crate::error::{AudioExtractionError, PipelineError, StageError, StorageError};
use crate::media::{self, AudioExtractor};
use crate::transcription::TranscriptionAdapter;
use crate::translation::TranslationAdapter;

/// Per-call processing options
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub want_timestamps: bool,
    /// Target language code; None skips translation
    pub target_language: Option<String>,
}

/// Outcome of one file in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemStatus {
    Completed,
    Failed,
    Cancelled,
}

/// One settled file in a batch report
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchItem {
    pub path: PathBuf,
    pub status: BatchItemStatus,
    /// Row id when one was created, even for failed items
    pub transcription_id: Option<String>,
    pub error: Option<String>,
}

/// Full outcome of a batch run, in input order
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn completed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.status == BatchItemStatus::Completed)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.status == BatchItemStatus::Failed)
            .count()
    }
}

/// Progress notification after each settled batch item
#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub path: PathBuf,
    pub status: BatchItemStatus,
    pub settled: usize,
    pub total: usize,
}

pub type ProgressCallback = Box<dyn Fn(BatchProgress) + Send + Sync>;

/// Orchestrates extraction, transcription, translation and persistence
pub struct Pipeline {
    db: Arc<DatabaseManager>,
    extractor: Arc<dyn AudioExtractor>,
    transcriber: TranscriptionAdapter,
    translator: TranslationAdapter,
    retry_policy: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        db: Arc<DatabaseManager>,
        extractor: Arc<dyn AudioExtractor>,
        transcriber: TranscriptionAdapter,
        translator: TranslationAdapter,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            db,
            extractor,
            transcriber,
            translator,
            retry_policy,
        }
    }

    /// Process a single video file for a client
    ///
    /// The returned row is always terminal: `completed` on success, `failed`
    /// with the captured cause otherwise. Storage failures are the one
    /// exception; they propagate without a repair attempt since the store
    /// itself can no longer be trusted to record the failure.
    pub async fn process_one(
        &self,
        video_path: &Path,
        client_id: &str,
        options: &ProcessOptions,
    ) -> Result<Transcription, PipelineError> {
        let filename = video_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let tx = self
            .claim_row(client_id, &filename)
            .map_err(|e| PipelineError::new(video_path, e))?;

        self.db
            .update_transcription_status(&tx.id, TranscriptionStatus::Processing, None)
            .map_err(|e| PipelineError::new(video_path, e))?;

        log::info!("Processing {} for client {}", video_path.display(), client_id);

        // Format rejection happens before any backend is touched, but still
        // leaves a terminal row behind for the record.
        if !media::is_supported_format(video_path) {
            let err = AudioExtractionError::UnsupportedFormat(video_path.to_path_buf());
            self.mark_failed(&tx.id, video_path, &err.to_string())?;
            return Err(PipelineError::new(video_path, err));
        }

        match self.run_stages(video_path, &tx.id, options).await {
            Ok(()) => {
                let row = self
                    .db
                    .get_transcription(&tx.id)
                    .map_err(|e| PipelineError::new(video_path, e))?
                    .ok_or_else(|| {
                        PipelineError::new(
                            video_path,
                            StorageError(anyhow::anyhow!(
                                "transcription {} vanished after completion",
                                tx.id
                            )),
                        )
                    })?;
                log::info!("Completed {} ({} chars)", filename, row.raw_text.len());
                Ok(row)
            }
            Err(StageError::Storage(e)) => Err(PipelineError::new(video_path, e)),
            Err(stage) => {
                let detail = stage.to_string();
                log::error!("Stage failure on {}: {}", video_path.display(), detail);
                self.mark_failed(&tx.id, video_path, &detail)?;
                Err(PipelineError::new(video_path, stage))
            }
        }
    }

    /// Process a set of inputs (files or directories) sequentially
    ///
    /// Each item settles on its own; one failure never aborts the rest. The
    /// cancel token is honored between items, and files not yet started when
    /// it fires are reported as cancelled, never silently dropped.
    pub async fn process_batch(
        &self,
        inputs: &[PathBuf],
        client_id: &str,
        options: &ProcessOptions,
        cancel_token: Option<CancellationToken>,
        progress: Option<ProgressCallback>,
    ) -> BatchReport {
        // An input that cannot be expanded settles as a failed item in
        // place, so the report stays in input order.
        enum Planned {
            File(PathBuf),
            Unreadable(PathBuf, String),
        }

        let mut planned: Vec<Planned> = Vec::new();
        for input in inputs {
            match media::expand_input(input) {
                Ok(expanded) => planned.extend(expanded.into_iter().map(Planned::File)),
                Err(e) => planned.push(Planned::Unreadable(
                    input.clone(),
                    format!("cannot read input: {}", e),
                )),
            }
        }

        let total = planned.len();
        let mut items: Vec<BatchItem> = Vec::with_capacity(total);
        let mut cancelled = false;

        for entry in planned {
            if let Some(ref token) = cancel_token {
                if token.is_cancelled() {
                    cancelled = true;
                }
            }

            let item = match entry {
                Planned::Unreadable(path, error) => BatchItem {
                    path,
                    status: BatchItemStatus::Failed,
                    transcription_id: None,
                    error: Some(error),
                },
                Planned::File(path) if cancelled => BatchItem {
                    path,
                    status: BatchItemStatus::Cancelled,
                    transcription_id: None,
                    error: None,
                },
                Planned::File(path) => match self.process_one(&path, client_id, options).await {
                    Ok(tx) => BatchItem {
                        path,
                        status: BatchItemStatus::Completed,
                        transcription_id: Some(tx.id),
                        error: None,
                    },
                    Err(e) => BatchItem {
                        path,
                        status: BatchItemStatus::Failed,
                        transcription_id: None,
                        error: Some(e.source.to_string()),
                    },
                },
            };

            if let Some(ref callback) = progress {
                callback(BatchProgress {
                    path: item.path.clone(),
                    status: item.status,
                    settled: items.len() + 1,
                    total,
                });
            }
            items.push(item);
        }

        log::info!(
            "Batch done: {} completed, {} failed, cancelled: {}",
            items
                .iter()
                .filter(|i| i.status == BatchItemStatus::Completed)
                .count(),
            items
                .iter()
                .filter(|i| i.status == BatchItemStatus::Failed)
                .count(),
            cancelled
        );

        BatchReport { items, cancelled }
    }

    /// Create the pending row for an attempt, honoring the retry policy
    ///
    /// ReuseRow removes a previous failed attempt for the same client and
    /// file so exactly one record per file remains; NewAttempt keeps the
    /// failed history and adds a fresh row.
    fn claim_row(&self, client_id: &str, filename: &str) -> Result<Transcription, StorageError> {
        if self.retry_policy == RetryPolicy::ReuseRow {
            if let Some(failed) = self.db.find_failed_transcription(client_id, filename)? {
                log::debug!(
                    "Replacing failed attempt {} for {}",
                    failed.id,
                    filename
                );
                self.db.delete_transcription(&failed.id)?;
            }
        }

        let tx = Transcription::pending(client_id, filename);
        self.db.create_transcription(&tx)?;
        Ok(tx)
    }

    async fn run_stages(
        &self,
        video_path: &Path,
        transcription_id: &str,
        options: &ProcessOptions,
    ) -> Result<(), StageError> {
        // ffmpeg is a blocking subprocess; keep it off the async runtime
        let extractor = Arc::clone(&self.extractor);
        let path = video_path.to_path_buf();
        let audio = tokio::task::spawn_blocking(move || extractor.extract(&path))
            .await
            .map_err(|e| {
                StageError::Input(std::io::Error::other(format!(
                    "extraction task failed: {}",
                    e
                )))
            })?
            .map_err(StageError::Audio)?;

        let result = self
            .transcriber
            .transcribe(audio.path(), options.want_timestamps)
            .await
            .map_err(StageError::Transcription)?;

        let translated = match &options.target_language {
            Some(lang) => Some(
                self.translator
                    .translate(&result.raw_text, lang)
                    .await
                    .map_err(StageError::Translation)?,
            ),
            None => None,
        };

        let segments: Vec<Segment> = result
            .segments
            .iter()
            .enumerate()
            .map(|(i, s)| {
                Segment::new(
                    transcription_id,
                    s.start_time,
                    s.end_time,
                    &s.text,
                    i as i64,
                )
            })
            .collect();

        self.db
            .complete_transcription(
                transcription_id,
                &result.raw_text,
                translated.as_deref(),
                options.target_language.as_deref(),
                &segments,
            )
            .map_err(StageError::Storage)?;

        Ok(())
    }

    fn mark_failed(
        &self,
        transcription_id: &str,
        video_path: &Path,
        detail: &str,
    ) -> Result<(), PipelineError> {
        self.db
            .update_transcription_status(
                transcription_id,
                TranscriptionStatus::Failed,
                Some(detail),
            )
            .map_err(|e| PipelineError::new(video_path, e))
    }
}

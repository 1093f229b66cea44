//! Runtime configuration
//!
//! Backend endpoints, the selected LLM model, adapter timeouts and limits,
//! persisted as a JSON settings file. Missing keys fall back to defaults so
//! older settings files keep loading after new fields are added.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Sampling options forwarded to the language-model backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub num_predict: u32,
    pub num_ctx: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            num_predict: 1024,
            num_ctx: 4096,
        }
    }
}

/// What a failed `process_one` attempt does on the next try
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Reuse the failed row for the same client + filename
    ReuseRow,
    /// Always insert a fresh attempt record
    NewAttempt,
}

/// Top-level configuration for the pipeline and chat manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the LLM server (Ollama-compatible)
    pub llm_base_url: String,
    /// Model identifier sent with every completion request
    pub model: String,
    /// Endpoint of the speech-recognition service
    pub transcription_url: String,
    /// Endpoint of the translation service
    pub translation_url: String,
    /// Timeout applied to every external adapter call, in seconds.
    /// Exceeding it is treated the same as a backend failure.
    pub request_timeout_secs: u64,
    /// Maximum characters per translation chunk
    pub max_chunk_chars: usize,
    /// Maximum transcript characters embedded in the persona prompt
    pub max_transcript_chars: usize,
    pub retry_policy: RetryPolicy,
    pub generation: GenerationOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_base_url: "http://localhost:11434".to_string(),
            model: "mistral:instruct".to_string(),
            transcription_url: "http://localhost:8080/inference".to_string(),
            translation_url: "http://localhost:5000/translate".to_string(),
            request_timeout_secs: 120,
            max_chunk_chars: 4500,
            max_transcript_chars: 12_000,
            retry_policy: RetryPolicy::ReuseRow,
            generation: GenerationOptions::default(),
        }
    }
}

impl Config {
    /// Load settings from a JSON file, falling back to defaults when the file
    /// does not exist
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("invalid settings file: {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No settings file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("cannot read {}", path.display())),
        }
    }

    /// Save settings as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self).context("cannot serialize settings")?;
        std::fs::write(path, contents)
            .with_context(|| format!("cannot write {}", path.display()))
    }

    /// Default settings location under the platform data directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("vidscribe").join("settings.json"))
    }
}

//! Translation adapter
//!
//! Wraps the opaque translation service. Long input is split into chunks at
//! sentence or paragraph boundaries, translated in order, and reassembled
//! with the original inter-chunk whitespace. A single failing chunk fails the
//! whole call: a partially-translated merged string is indistinguishable from
//! a translated one downstream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::TranslationError;

/// The opaque translation function: text + target language in, text out
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn translate_chunk(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, TranslationError>;
}

/// One chunk of the input plus the whitespace that followed it
#[derive(Debug, Clone, PartialEq)]
struct Chunk {
    body: String,
    trailing: String,
}

/// Split text into units ending at sentence or paragraph boundaries
///
/// Every character of the input lands in exactly one body or trailing
/// string, so re-concatenation reproduces the original text.
fn split_units(text: &str) -> Vec<Chunk> {
    let mut units = Vec::new();
    let mut body = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            let mut ws = String::from(c);
            while let Some(&n) = chars.peek() {
                if n == '\n' || n == ' ' || n == '\t' {
                    ws.push(n);
                    chars.next();
                } else {
                    break;
                }
            }
            units.push(Chunk {
                body: std::mem::take(&mut body),
                trailing: ws,
            });
        } else {
            body.push(c);
            if matches!(c, '.' | '!' | '?') && chars.peek() == Some(&' ') {
                let mut ws = String::new();
                while let Some(&n) = chars.peek() {
                    if n == ' ' {
                        ws.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                units.push(Chunk {
                    body: std::mem::take(&mut body),
                    trailing: ws,
                });
            }
        }
    }

    if !body.is_empty() {
        units.push(Chunk {
            body,
            trailing: String::new(),
        });
    }
    units
}

/// Pack boundary units into chunks no longer than `max_chars`
///
/// A single unit longer than the limit (no boundaries at all) is hard-split;
/// mid-sentence truncation beats exceeding the provider limit.
fn split_chunks(text: &str, max_chars: usize) -> Vec<Chunk> {
    if text.chars().count() <= max_chars {
        return vec![Chunk {
            body: text.to_string(),
            trailing: String::new(),
        }];
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current = Chunk {
        body: String::new(),
        trailing: String::new(),
    };

    let mut flush = |current: &mut Chunk, chunks: &mut Vec<Chunk>| {
        if !current.body.is_empty() || !current.trailing.is_empty() {
            chunks.push(std::mem::replace(
                current,
                Chunk {
                    body: String::new(),
                    trailing: String::new(),
                },
            ));
        }
    };

    for unit in split_units(text) {
        let unit_len = unit.body.chars().count();

        if unit_len > max_chars {
            flush(&mut current, &mut chunks);
            let chars: Vec<char> = unit.body.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(Chunk {
                    body: piece.iter().collect(),
                    trailing: String::new(),
                });
            }
            if let Some(last) = chunks.last_mut() {
                last.trailing = unit.trailing;
            }
            continue;
        }

        let current_len = current.body.chars().count() + current.trailing.chars().count();
        if current_len + unit_len > max_chars {
            flush(&mut current, &mut chunks);
        }

        current.body.push_str(&current.trailing);
        current.trailing.clear();
        current.body.push_str(&unit.body);
        current.trailing = unit.trailing;
    }
    flush(&mut current, &mut chunks);

    chunks
}

/// Adapter in front of the translation backend
pub struct TranslationAdapter {
    backend: Arc<dyn TranslationBackend>,
    max_chunk_chars: usize,
}

impl TranslationAdapter {
    pub fn new(backend: Arc<dyn TranslationBackend>, max_chunk_chars: usize) -> Self {
        Self {
            backend,
            max_chunk_chars,
        }
    }

    /// Translate text into the target language, chunking as needed
    pub async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, TranslationError> {
        if target_language.trim().is_empty() {
            return Err(TranslationError::InvalidLanguage(
                target_language.to_string(),
            ));
        }
        if text.is_empty() {
            return Ok(String::new());
        }

        let chunks = split_chunks(text, self.max_chunk_chars);
        log::debug!(
            "Translating {} chars in {} chunk(s) to '{}'",
            text.len(),
            chunks.len(),
            target_language
        );

        let mut output = String::with_capacity(text.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let translated = self
                .backend
                .translate_chunk(&chunk.body, target_language)
                .await
                .map_err(|e| TranslationError::ChunkFailed {
                    index,
                    detail: e.to_string(),
                })?;
            output.push_str(&translated);
            output.push_str(&chunk.trailing);
        }

        Ok(output)
    }
}

/// Wire format of the translation HTTP service
#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// HTTP backend for a local LibreTranslate-style service
pub struct HttpTranslationBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranslationBackend {
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
impl TranslationBackend for HttpTranslationBackend {
    async fn translate_chunk(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, TranslationError> {
        let request = TranslateRequest {
            q: text,
            source: "auto",
            target: target_language,
            format: "text",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    TranslationError::BackendUnavailable(e.to_string())
                } else {
                    TranslationError::BackendUnavailable(format!("request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::BackendUnavailable(format!(
                "backend returned {}: {}",
                status, body
            )));
        }

        let parsed: TranslateResponse = response.json().await.map_err(|e| {
            TranslationError::BackendUnavailable(format!("invalid response: {}", e))
        })?;

        Ok(parsed.translated_text)
    }
}

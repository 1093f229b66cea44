//! Persona synthesis
//!
//! Turns a completed transcript into a conversational profile: a display
//! name, a short description and a system prompt that instructs the language
//! model to answer as the person speaking in the source video. Regenerating a
//! persona replaces the previous one and drops its chat history with it.

use std::sync::Arc;

use crate::config::GenerationOptions;
use crate::database::models::PersonaProfile;
use crate::database::{DatabaseManager, TranscriptionStatus};
use crate::error::PersonaError;
use crate::llm_engine::{CompletionRequest, LlmProvider, Message};

const SYNTHESIS_INSTRUCTIONS: &str = "\
You analyze interview and presentation transcripts. Given a transcript, \
derive the profile of the main speaker. Answer in exactly this format:\n\
NAME: a short display name for the speaker\n\
DESCRIPTION: two or three sentences describing who the speaker is, their \
expertise and their manner of speaking\n\
PROMPT: a system prompt, written in the second person, instructing a \
language model to converse as this speaker, staying within what the \
transcript supports";

/// Parsed NAME/DESCRIPTION/PROMPT sections of a synthesis response
#[derive(Debug, PartialEq)]
struct ParsedProfile {
    name: Option<String>,
    description: Option<String>,
    prompt: Option<String>,
}

/// Pull the labelled sections out of a model response
///
/// Sections may span multiple lines; a missing label leaves that field None
/// so the caller can fall back instead of failing the whole synthesis.
fn parse_profile_response(response: &str) -> ParsedProfile {
    enum Section {
        Name,
        Description,
        Prompt,
    }

    let mut name: Option<String> = None;
    let mut description: Option<String> = None;
    let mut prompt: Option<String> = None;
    let mut current: Option<Section> = None;

    for line in response.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("NAME:") {
            name = Some(rest.trim().to_string());
            current = Some(Section::Name);
        } else if let Some(rest) = trimmed.strip_prefix("DESCRIPTION:") {
            description = Some(rest.trim().to_string());
            current = Some(Section::Description);
        } else if let Some(rest) = trimmed.strip_prefix("PROMPT:") {
            prompt = Some(rest.trim().to_string());
            current = Some(Section::Prompt);
        } else if let Some(ref section) = current {
            let target = match section {
                Section::Name => &mut name,
                Section::Description => &mut description,
                Section::Prompt => &mut prompt,
            };
            if let Some(text) = target.as_mut() {
                if !trimmed.is_empty() {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(trimmed);
                }
            }
        }
    }

    let non_empty = |s: Option<String>| s.filter(|v| !v.is_empty());
    ParsedProfile {
        name: non_empty(name),
        description: non_empty(description),
        prompt: non_empty(prompt),
    }
}

/// Cut a transcript to at most `max_chars` characters, keeping the start
///
/// Returns the kept text and whether anything was dropped.
fn truncate_transcript(text: &str, max_chars: usize) -> (String, bool) {
    if text.chars().count() <= max_chars {
        return (text.to_string(), false);
    }
    (text.chars().take(max_chars).collect(), true)
}

/// Builds persona profiles from completed transcriptions
pub struct PersonaSynthesizer {
    db: Arc<DatabaseManager>,
    llm: Arc<dyn LlmProvider>,
    model: String,
    options: GenerationOptions,
    max_transcript_chars: usize,
}

impl PersonaSynthesizer {
    pub fn new(
        db: Arc<DatabaseManager>,
        llm: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        options: GenerationOptions,
        max_transcript_chars: usize,
    ) -> Self {
        Self {
            db,
            llm,
            model: model.into(),
            options,
            max_transcript_chars,
        }
    }

    /// Synthesize (or re-synthesize) the persona for a transcription
    ///
    /// Only completed transcriptions with a non-empty transcript qualify. The
    /// stored persona is replaced atomically; its old chat history goes with
    /// it, since conversations with a superseded profile would be misleading.
    pub async fn generate_persona(
        &self,
        transcription_id: &str,
    ) -> Result<PersonaProfile, PersonaError> {
        let transcription = self
            .db
            .get_transcription(transcription_id)?
            .ok_or_else(|| PersonaError::InsufficientInput {
                transcription_id: transcription_id.to_string(),
                reason: "transcription not found".to_string(),
            })?;

        if transcription.status != TranscriptionStatus::Completed {
            return Err(PersonaError::InsufficientInput {
                transcription_id: transcription_id.to_string(),
                reason: format!("status is {}", transcription.status.as_str()),
            });
        }

        // Chat in the target language when a translation exists
        let source_text = transcription
            .translated_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&transcription.raw_text);

        if source_text.trim().is_empty() {
            return Err(PersonaError::InsufficientInput {
                transcription_id: transcription_id.to_string(),
                reason: "transcript is empty".to_string(),
            });
        }

        let (transcript, truncated) =
            truncate_transcript(source_text, self.max_transcript_chars);
        if truncated {
            log::warn!(
                "Transcript for {} truncated to {} chars for persona synthesis",
                transcription_id,
                self.max_transcript_chars
            );
        }

        let request = CompletionRequest::new(
            &self.model,
            vec![
                Message::system(SYNTHESIS_INSTRUCTIONS),
                Message::user(format!("Transcript:\n\n{}", transcript)),
            ],
        )
        .with_options(self.options.clone());

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| PersonaError::BackendFailure(e.to_string()))?;

        let parsed = parse_profile_response(&response.content);
        if parsed.prompt.is_none() {
            log::warn!(
                "Model response for {} lacked a PROMPT section, using full response",
                transcription_id
            );
        }

        let name = parsed
            .name
            .unwrap_or_else(|| format!("Speaker of {}", transcription.source_filename));
        let description = parsed
            .description
            .unwrap_or_else(|| response.content.chars().take(200).collect());
        let system_prompt = parsed
            .prompt
            .unwrap_or_else(|| response.content.trim().to_string());

        let persona = PersonaProfile::new(
            transcription_id,
            &name,
            &description,
            &system_prompt,
            &response.model,
            truncated,
        );
        self.db.upsert_persona(&persona)?;

        log::info!(
            "Synthesized persona '{}' for transcription {}",
            persona.name,
            transcription_id
        );
        Ok(persona)
    }
}

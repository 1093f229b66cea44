//! Full flow through the public API: batch processing, persona synthesis,
//! chat, export. Backends are in-process fakes; only ffmpeg is skipped.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;

use vidscribe::database::models::Client;
use vidscribe::database::TranscriptionStatus;
use vidscribe::llm_engine::{
    CompletionRequest, CompletionResponse, LlmError, LlmModelInfo, LlmProvider, StreamCallback,
};
use vidscribe::media::{AudioExtractor, ExtractedAudio};
use vidscribe::{
    AudioExtractionError, ChatSessionManager, Config, DatabaseManager, PersonaSynthesizer,
    Pipeline, ProcessOptions, TranscriptResult, TranscriptSegment, TranscriptionAdapter,
    TranscriptionBackend, TranscriptionError, TranslationAdapter, TranslationBackend,
    TranslationError,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct FakeExtractor;

impl AudioExtractor for FakeExtractor {
    fn extract(&self, _video_path: &Path) -> Result<ExtractedAudio, AudioExtractionError> {
        let temp = tempfile::Builder::new()
            .suffix(".wav")
            .tempfile()
            .map_err(|e| AudioExtractionError::TempFile(e.to_string()))?;
        std::fs::write(temp.path(), vec![0u8; 256]).unwrap();
        Ok(ExtractedAudio::from_temp_path(temp.into_temp_path()))
    }
}

struct FakeTranscriber;

#[async_trait]
impl TranscriptionBackend for FakeTranscriber {
    async fn transcribe(
        &self,
        _audio_path: &Path,
        want_timestamps: bool,
    ) -> Result<TranscriptResult, TranscriptionError> {
        let segments = if want_timestamps {
            vec![
                TranscriptSegment {
                    start_time: 0.0,
                    end_time: 3.0,
                    text: "I research distributed storage.".to_string(),
                },
                TranscriptSegment {
                    start_time: 3.0,
                    end_time: 6.0,
                    text: "Consistency is the hard part.".to_string(),
                },
            ]
        } else {
            vec![]
        };
        Ok(TranscriptResult {
            raw_text: "I research distributed storage. Consistency is the hard part."
                .to_string(),
            segments,
        })
    }
}

struct EchoTranslator;

#[async_trait]
impl TranslationBackend for EchoTranslator {
    async fn translate_chunk(
        &self,
        text: &str,
        _target_language: &str,
    ) -> Result<String, TranslationError> {
        Ok(text.to_string())
    }
}

struct ScriptedLlm;

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    async fn list_models(&self) -> Result<Vec<LlmModelInfo>, LlmError> {
        Ok(vec![])
    }

    async fn is_ready(&self) -> bool {
        true
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        // Persona synthesis carries the transcript; chat turns carry history
        let is_synthesis = request
            .messages
            .iter()
            .any(|m| m.content.contains("Transcript:"));
        let content = if is_synthesis {
            "NAME: Storage Researcher\nDESCRIPTION: Works on distributed storage.\nPROMPT: You are a distributed storage researcher."
                .to_string()
        } else {
            "Replication without consensus gets you eventual consistency at best.".to_string()
        };
        Ok(CompletionResponse {
            content,
            model: request.model,
            prompt_tokens: None,
            completion_tokens: None,
        })
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        callback: StreamCallback,
        _cancel_token: Option<tokio_util::sync::CancellationToken>,
    ) -> Result<CompletionResponse, LlmError> {
        let response = self.complete(request).await?;
        callback(response.content.clone());
        Ok(response)
    }
}

#[tokio::test]
async fn test_video_to_chatting_persona() {
    init_logging();
    let config = Config::default();

    let dir = tempdir().unwrap();
    let db = Arc::new(DatabaseManager::new(dir.path().join("e2e.db")).unwrap());

    let client = Client::new("Acme", "acme@example.com");
    db.create_client(&client).unwrap();

    let pipeline = Pipeline::new(
        Arc::clone(&db),
        Arc::new(FakeExtractor),
        TranscriptionAdapter::new(Arc::new(FakeTranscriber)),
        TranslationAdapter::new(Arc::new(EchoTranslator), config.max_chunk_chars),
        config.retry_policy,
    );

    // Batch over a directory with one stray non-video file
    let input_dir = tempdir().unwrap();
    for name in ["interview.mp4", "readme.txt"] {
        std::fs::write(input_dir.path().join(name), b"x").unwrap();
    }

    let options = ProcessOptions {
        want_timestamps: true,
        target_language: Some("en".to_string()),
    };
    let report = pipeline
        .process_batch(
            &[input_dir.path().to_path_buf()],
            &client.id,
            &options,
            None,
            None,
        )
        .await;

    assert!(!report.cancelled);
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.completed_count(), 1);

    let tx_id = report.items[0].transcription_id.clone().unwrap();
    let tx = db.get_transcription(&tx_id).unwrap().unwrap();
    assert_eq!(tx.status, TranscriptionStatus::Completed);
    assert!(tx.has_timestamps);
    assert!(tx.translated_text.is_some());

    // Timestamped export of the stored segments
    let segments = db.get_segments(&tx_id).unwrap();
    let exported = vidscribe::export::export_transcription(&tx, &segments);
    assert!(exported.starts_with("[00:00] I research distributed storage."));
    assert!(exported.contains("[00:03]"));

    // Persona synthesis from the completed transcript
    let llm: Arc<dyn LlmProvider> = Arc::new(ScriptedLlm);
    let synthesizer = PersonaSynthesizer::new(
        Arc::clone(&db),
        Arc::clone(&llm),
        &config.model,
        config.generation.clone(),
        config.max_transcript_chars,
    );
    let persona = synthesizer.generate_persona(&tx_id).await.unwrap();
    assert_eq!(persona.name, "Storage Researcher");

    // A chat turn against the persona
    let chat = ChatSessionManager::new(
        Arc::clone(&db),
        llm,
        &config.model,
        config.generation.clone(),
    );
    let reply = chat
        .send_message(&persona.id, "How should I replicate my data?")
        .await
        .unwrap();
    assert!(reply.content.contains("consistency"));
    assert_eq!(db.list_chat_messages(&persona.id).unwrap().len(), 2);
}

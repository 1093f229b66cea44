//! Persona chat sessions
//!
//! One conversation per persona, backed by the append-only chat history in
//! the record store. A turn appends the user message first, so a backend
//! failure never loses what the user typed; the session then sits in an
//! error state until the caller retries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::GenerationOptions;
use crate::database::models::{ChatMessage, ChatRole, PersonaProfile};
use crate::database::DatabaseManager;
use crate::error::{ChatError, StorageError};
use crate::llm_engine::{CompletionRequest, LlmProvider, Message, StreamCallback};

/// Lifecycle of a persona's chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingResponse,
    /// Last turn's backend call failed; the user message is persisted and
    /// the caller may retry
    Error,
}

/// Manages chat turns and session state per persona
pub struct ChatSessionManager {
    db: Arc<DatabaseManager>,
    llm: Arc<dyn LlmProvider>,
    model: String,
    options: GenerationOptions,
    states: Mutex<HashMap<String, SessionState>>,
}

impl ChatSessionManager {
    pub fn new(
        db: Arc<DatabaseManager>,
        llm: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            db,
            llm,
            model: model.into(),
            options,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Current session state for a persona; unseen personas are idle
    pub fn session_state(&self, persona_id: &str) -> SessionState {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(persona_id)
            .copied()
            .unwrap_or(SessionState::Idle)
    }

    fn set_state(&self, persona_id: &str, state: SessionState) {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(persona_id.to_string(), state);
    }

    /// Send a user message and wait for the persona's reply
    ///
    /// Returns the appended persona message. Sending while a previous turn
    /// is still awaiting its response is rejected without persisting
    /// anything.
    pub async fn send_message(
        &self,
        persona_id: &str,
        user_text: &str,
    ) -> Result<ChatMessage, ChatError> {
        let request = self.begin_turn(persona_id, user_text)?;

        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                self.set_state(persona_id, SessionState::Error);
                return Err(ChatError::Backend(e.to_string()));
            }
        };

        self.finish_turn(persona_id, &response.content)
    }

    /// Send a user message, streaming the reply chunks through `callback`
    ///
    /// The full reply is still persisted as one message once the stream
    /// ends.
    pub async fn send_message_streaming(
        &self,
        persona_id: &str,
        user_text: &str,
        callback: StreamCallback,
        cancel_token: Option<tokio_util::sync::CancellationToken>,
    ) -> Result<ChatMessage, ChatError> {
        let mut request = self.begin_turn(persona_id, user_text)?;
        request.stream = true;

        let response = match self
            .llm
            .complete_streaming(request, callback, cancel_token)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.set_state(persona_id, SessionState::Error);
                return Err(ChatError::Backend(e.to_string()));
            }
        };

        self.finish_turn(persona_id, &response.content)
    }

    /// Clear a persona's chat history and return the session to idle
    ///
    /// Used when the persona is regenerated; conversations with the old
    /// profile would be misleading against the new one.
    pub fn reset(&self, persona_id: &str) -> Result<(), ChatError> {
        self.require_persona(persona_id)?;
        self.db.clear_chat_messages(persona_id)?;
        self.set_state(persona_id, SessionState::Idle);
        log::info!("Chat history reset for persona {}", persona_id);
        Ok(())
    }

    fn require_persona(&self, persona_id: &str) -> Result<PersonaProfile, ChatError> {
        self.db
            .get_persona(persona_id)?
            .ok_or_else(|| ChatError::UnknownPersona(persona_id.to_string()))
    }

    /// Guard the session, persist the user message and build the request
    fn begin_turn(
        &self,
        persona_id: &str,
        user_text: &str,
    ) -> Result<CompletionRequest, ChatError> {
        let persona = self.require_persona(persona_id)?;

        {
            let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
            if states.get(persona_id) == Some(&SessionState::AwaitingResponse) {
                return Err(ChatError::Busy(persona_id.to_string()));
            }
            states.insert(persona_id.to_string(), SessionState::AwaitingResponse);
        }

        // The user message commits before the backend call; a failed turn
        // must not lose it. A storage failure here releases the busy guard
        // before propagating.
        let persisted = (|| {
            let sequence_id = self.db.next_chat_sequence_id(persona_id)?;
            self.db
                .append_chat_message(&ChatMessage::user(persona_id, user_text, sequence_id))?;
            self.db.list_chat_messages(persona_id)
        })();
        let history = match persisted {
            Ok(history) => history,
            Err(e) => {
                self.set_state(persona_id, SessionState::Error);
                return Err(e.into());
            }
        };
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(&persona.system_prompt));
        for msg in &history {
            messages.push(match msg.role {
                ChatRole::User => Message::user(&msg.content),
                ChatRole::Persona => Message::assistant(&msg.content),
            });
        }

        Ok(CompletionRequest::new(&self.model, messages).with_options(self.options.clone()))
    }

    /// Persist the persona reply and return the session to idle
    ///
    /// A storage failure here lands the session in the error state, same as
    /// a backend failure; a session must never stay awaiting a response once
    /// the turn has resolved, or every retry would be rejected as busy.
    fn finish_turn(&self, persona_id: &str, reply: &str) -> Result<ChatMessage, ChatError> {
        let persisted = (|| {
            let sequence_id = self.db.next_chat_sequence_id(persona_id)?;
            let message = ChatMessage::persona(persona_id, reply, sequence_id);
            self.db.append_chat_message(&message)?;
            Ok::<_, StorageError>(message)
        })();

        match persisted {
            Ok(message) => {
                self.set_state(persona_id, SessionState::Idle);
                Ok(message)
            }
            Err(e) => {
                self.set_state(persona_id, SessionState::Error);
                Err(e.into())
            }
        }
    }

    #[cfg(test)]
    fn force_state(&self, persona_id: &str, state: SessionState) {
        self.set_state(persona_id, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Client, Transcription, TranscriptionStatus};
    use crate::llm_engine::{CompletionResponse, LlmError, LlmModelInfo, MessageRole};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct FakeLlm {
        response: Result<String, LlmError>,
        last_request: Mutex<Option<CompletionRequest>>,
    }

    impl FakeLlm {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(text.to_string()),
                last_request: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: Err(LlmError::ProviderUnavailable("down".to_string())),
                last_request: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for FakeLlm {
        fn provider_name(&self) -> &'static str {
            "fake"
        }

        async fn list_models(&self) -> Result<Vec<LlmModelInfo>, LlmError> {
            Ok(vec![])
        }

        async fn is_ready(&self) -> bool {
            true
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let model = request.model.clone();
            *self.last_request.lock().unwrap() = Some(request);
            self.response.clone().map(|content| CompletionResponse {
                content,
                model,
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
            // Two chunks, to exercise accumulation on the caller side
            let half = response.content.len() / 2;
            callback(response.content[..half].to_string());
            callback(response.content[half..].to_string());
            Ok(response)
        }
    }

    fn setup_persona() -> (tempfile::TempDir, Arc<DatabaseManager>, String) {
        let dir = tempdir().unwrap();
        let db = Arc::new(DatabaseManager::new(dir.path().join("test.db")).unwrap());

        let client = Client::new("Test", "test@example.com");
        db.create_client(&client).unwrap();
        let tx = Transcription::pending(&client.id, "talk.mp4");
        db.create_transcription(&tx).unwrap();
        db.update_transcription_status(&tx.id, TranscriptionStatus::Processing, None)
            .unwrap();
        db.complete_transcription(&tx.id, "text", None, None, &[])
            .unwrap();

        let persona =
            PersonaProfile::new(&tx.id, "Ada", "researcher", "You are Ada.", "m", false);
        db.upsert_persona(&persona).unwrap();

        (dir, db, persona.id)
    }

    fn manager(db: Arc<DatabaseManager>, llm: Arc<FakeLlm>) -> ChatSessionManager {
        ChatSessionManager::new(db, llm, "test-model", GenerationOptions::default())
    }

    #[tokio::test]
    async fn test_turn_appends_user_then_persona() {
        let (_dir, db, persona_id) = setup_persona();
        let llm = FakeLlm::replying("Hello from Ada");
        let chat = manager(db.clone(), llm);

        let reply = chat.send_message(&persona_id, "Hi there").await.unwrap();
        assert_eq!(reply.role, ChatRole::Persona);
        assert_eq!(reply.content, "Hello from Ada");
        assert_eq!(chat.session_state(&persona_id), SessionState::Idle);

        let history = db.list_chat_messages(&persona_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[0].sequence_id, 1);
        assert_eq!(history[1].role, ChatRole::Persona);
        assert_eq!(history[1].sequence_id, 2);
    }

    #[tokio::test]
    async fn test_request_carries_system_prompt_and_history() {
        let (_dir, db, persona_id) = setup_persona();
        let llm = FakeLlm::replying("reply one");
        let chat = manager(db.clone(), Arc::clone(&llm));

        chat.send_message(&persona_id, "first").await.unwrap();
        chat.send_message(&persona_id, "second").await.unwrap();

        let request = llm.last_request.lock().unwrap().take().unwrap();
        let roles: Vec<_> = request.messages.iter().map(|m| m.role.clone()).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );
        assert_eq!(request.messages[0].content, "You are Ada.");
        assert_eq!(request.messages[3].content, "second");
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_user_message() {
        let (_dir, db, persona_id) = setup_persona();
        let chat = manager(db.clone(), FakeLlm::failing());

        let err = chat.send_message(&persona_id, "Hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Backend(_)));
        assert_eq!(chat.session_state(&persona_id), SessionState::Error);

        // The committed user action survives, without a phantom reply
        let history = db.list_chat_messages(&persona_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, ChatRole::User);
    }

    /// Replies normally, but first deletes the transcription behind the
    /// persona; the cascade removes the persona row so persisting the reply
    /// hits a foreign key failure after the turn already began.
    struct VanishingPersonaLlm {
        db: Arc<DatabaseManager>,
        transcription_id: String,
    }

    #[async_trait]
    impl LlmProvider for VanishingPersonaLlm {
        fn provider_name(&self) -> &'static str {
            "vanishing"
        }

        async fn list_models(&self) -> Result<Vec<LlmModelInfo>, LlmError> {
            Ok(vec![])
        }

        async fn is_ready(&self) -> bool {
            true
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.db.delete_transcription(&self.transcription_id).unwrap();
            Ok(CompletionResponse {
                content: "too late".to_string(),
                model: request.model,
                prompt_tokens: None,
                completion_tokens: None,
            })
        }

        async fn complete_streaming(
            &self,
            request: CompletionRequest,
            _callback: StreamCallback,
            _cancel_token: Option<tokio_util::sync::CancellationToken>,
        ) -> Result<CompletionResponse, LlmError> {
            self.complete(request).await
        }
    }

    #[tokio::test]
    async fn test_reply_storage_failure_leaves_recoverable_state() {
        let dir = tempdir().unwrap();
        let db = Arc::new(DatabaseManager::new(dir.path().join("test.db")).unwrap());

        let client = Client::new("Test", "test@example.com");
        db.create_client(&client).unwrap();
        let tx = Transcription::pending(&client.id, "talk.mp4");
        db.create_transcription(&tx).unwrap();
        db.update_transcription_status(&tx.id, TranscriptionStatus::Processing, None)
            .unwrap();
        db.complete_transcription(&tx.id, "text", None, None, &[])
            .unwrap();
        let persona =
            PersonaProfile::new(&tx.id, "Ada", "researcher", "You are Ada.", "m", false);
        db.upsert_persona(&persona).unwrap();

        let llm = Arc::new(VanishingPersonaLlm {
            db: Arc::clone(&db),
            transcription_id: tx.id.clone(),
        });
        let chat = ChatSessionManager::new(
            Arc::clone(&db),
            llm,
            "test-model",
            GenerationOptions::default(),
        );

        let err = chat.send_message(&persona.id, "Hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Storage(_)));

        // The session resolved to the recoverable error state, not a
        // permanent busy
        assert_eq!(chat.session_state(&persona.id), SessionState::Error);
        let retry = chat.send_message(&persona.id, "Hi again").await.unwrap_err();
        assert!(!matches!(retry, ChatError::Busy(_)));
    }

    #[tokio::test]
    async fn test_retry_after_error_resumes() {
        let (_dir, db, persona_id) = setup_persona();

        let failing = manager(db.clone(), FakeLlm::failing());
        failing.send_message(&persona_id, "Hi").await.unwrap_err();

        let working = manager(db.clone(), FakeLlm::replying("recovered"));
        let reply = working.send_message(&persona_id, "Hi again").await.unwrap();

        // Sequence continues past the orphaned user message
        assert_eq!(reply.sequence_id, 3);
        assert_eq!(db.list_chat_messages(&persona_id).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_busy_session_rejects_without_persisting() {
        let (_dir, db, persona_id) = setup_persona();
        let chat = manager(db.clone(), FakeLlm::replying("x"));

        chat.force_state(&persona_id, SessionState::AwaitingResponse);
        let err = chat.send_message(&persona_id, "Hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Busy(_)));
        assert!(db.list_chat_messages(&persona_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_persona() {
        let (_dir, db, _persona_id) = setup_persona();
        let chat = manager(db, FakeLlm::replying("x"));

        let err = chat.send_message("nope", "Hi").await.unwrap_err();
        assert!(matches!(err, ChatError::UnknownPersona(_)));
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let (_dir, db, persona_id) = setup_persona();
        let chat = manager(db.clone(), FakeLlm::replying("x"));

        chat.send_message(&persona_id, "Hi").await.unwrap();
        chat.reset(&persona_id).unwrap();

        assert!(db.list_chat_messages(&persona_id).unwrap().is_empty());
        assert_eq!(chat.session_state(&persona_id), SessionState::Idle);

        // Next turn starts a fresh sequence
        let reply = chat.send_message(&persona_id, "Hello").await.unwrap();
        assert_eq!(reply.sequence_id, 2);
    }

    #[tokio::test]
    async fn test_streaming_persists_full_reply() {
        let (_dir, db, persona_id) = setup_persona();
        let chat = manager(db.clone(), FakeLlm::replying("streamed reply"));

        let chunks = Arc::new(Mutex::new(String::new()));
        let chunks_clone = Arc::clone(&chunks);
        let callback: StreamCallback = Box::new(move |chunk| {
            chunks_clone.lock().unwrap().push_str(&chunk);
        });

        let reply = chat
            .send_message_streaming(&persona_id, "Hi", callback, None)
            .await
            .unwrap();

        assert_eq!(reply.content, "streamed reply");
        assert_eq!(*chunks.lock().unwrap(), "streamed reply");
        assert_eq!(db.list_chat_messages(&persona_id).unwrap().len(), 2);
    }
}

//! LLM provider trait and types
//!
//! Defines the common interface for conversational language-model backends.
//! The model to use travels with each request rather than living as provider
//! state, so one provider instance can serve persona generation and chat with
//! different models.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::GenerationOptions;

/// Error types for LLM operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LlmError {
    /// Model not found or not pulled
    ModelNotFound(String),
    /// Provider not available (e.g., Ollama not running)
    ProviderUnavailable(String),
    /// Request failed (network, timeout, etc.)
    RequestFailed(String),
    /// Invalid request parameters
    InvalidRequest(String),
    /// Inference/completion failed
    InferenceFailed(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            LlmError::ProviderUnavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            LlmError::RequestFailed(msg) => write!(f, "Request failed: {}", msg),
            LlmError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            LlmError::InferenceFailed(msg) => write!(f, "Inference failed: {}", msg),
        }
    }
}

impl std::error::Error for LlmError {}

/// Role of a message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request for text completion/generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model to run the request against
    pub model: String,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Sampling parameters
    pub options: GenerationOptions,
    /// Whether to stream the response
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: GenerationOptions::default(),
            stream: false,
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

/// Response from a completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text content
    pub content: String,
    /// Model that generated the response
    pub model: String,
    /// Number of tokens in the prompt
    pub prompt_tokens: Option<u32>,
    /// Number of tokens generated
    pub completion_tokens: Option<u32>,
}

/// Information about an available model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmModelInfo {
    /// Unique identifier for the model
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Model description
    pub description: Option<String>,
    /// Model size in bytes
    pub size_bytes: Option<u64>,
}

/// Callback for streaming responses
pub type StreamCallback = Box<dyn Fn(String) + Send + Sync>;

/// The trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "ollama")
    fn provider_name(&self) -> &'static str;

    /// List available models for this provider
    async fn list_models(&self) -> Result<Vec<LlmModelInfo>, LlmError>;

    /// Check if the provider is reachable
    async fn is_ready(&self) -> bool;

    /// Run a completion request (non-streaming)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Run a completion request with streaming
    ///
    /// The callback is called for each token/chunk received. The optional
    /// cancel token stops reading the stream mid-generation.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        callback: StreamCallback,
        cancel_token: Option<tokio_util::sync::CancellationToken>,
    ) -> Result<CompletionResponse, LlmError>;
}

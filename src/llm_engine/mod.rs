// Language model access: provider contract plus the Ollama implementation

pub mod provider;
pub mod providers;

pub use provider::{
    CompletionRequest, CompletionResponse, LlmError, LlmModelInfo, LlmProvider, Message,
    MessageRole, StreamCallback,
};
pub use providers::ollama_provider::{OllamaConfig, OllamaProvider};

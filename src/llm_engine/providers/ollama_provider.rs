//! Ollama API provider
//!
//! Connects to a running Ollama server (default: localhost:11434)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::GenerationOptions;
use crate::llm_engine::provider::{
    CompletionRequest, CompletionResponse, LlmError, LlmModelInfo, LlmProvider, Message,
    MessageRole, StreamCallback,
};

/// Ollama API message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

impl From<&Message> for OllamaMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: match msg.role {
                MessageRole::System => "system".to_string(),
                MessageRole::User => "user".to_string(),
                MessageRole::Assistant => "assistant".to_string(),
            },
            content: msg.content.clone(),
        }
    }
}

/// Ollama chat request
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    repeat_penalty: f32,
    num_predict: u32,
    num_ctx: u32,
}

impl From<&GenerationOptions> for OllamaOptions {
    fn from(opts: &GenerationOptions) -> Self {
        Self {
            temperature: opts.temperature,
            top_p: opts.top_p,
            top_k: opts.top_k,
            repeat_penalty: opts.repeat_penalty,
            num_predict: opts.num_predict,
            num_ctx: opts.num_ctx,
        }
    }
}

/// Ollama chat response
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    model: String,
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Ollama model list response
#[derive(Debug, Deserialize)]
struct OllamaModelList {
    models: Vec<OllamaModelEntry>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelEntry {
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    details: Option<OllamaModelDetails>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelDetails {
    #[serde(default)]
    parameter_size: Option<String>,
    #[serde(default)]
    family: Option<String>,
}

/// Ollama version response
#[derive(Debug, Deserialize)]
struct OllamaVersion {
    version: String,
}

/// Accumulates stream bytes and yields complete NDJSON lines
///
/// A JSON object may arrive split across network chunks; the partial tail is
/// held back until its newline shows up.
struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// The unterminated tail once the stream ends
    fn finish(self) -> Option<String> {
        let line = self.buffer.trim();
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }
}

/// Ollama provider configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    config: OllamaConfig,
    client: Client,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    pub fn with_default_config() -> Self {
        Self::new(OllamaConfig::default())
    }

    /// Check if the Ollama server is running
    pub async fn check_connection(&self) -> Result<String, LlmError> {
        let url = format!("{}/api/version", self.config.base_url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            LlmError::ProviderUnavailable(format!("Cannot connect to Ollama: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(LlmError::ProviderUnavailable(
                "Ollama server returned error".to_string(),
            ));
        }

        let version: OllamaVersion = response
            .json()
            .await
            .map_err(|e| LlmError::ProviderUnavailable(format!("Invalid response: {}", e)))?;

        Ok(version.version)
    }

    fn build_request(request: &CompletionRequest, stream: bool) -> Result<OllamaChatRequest, LlmError> {
        if request.model.trim().is_empty() {
            return Err(LlmError::InvalidRequest("empty model id".to_string()));
        }
        if request.messages.is_empty() {
            return Err(LlmError::InvalidRequest("no messages".to_string()));
        }

        Ok(OllamaChatRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(OllamaMessage::from).collect(),
            stream,
            options: OllamaOptions::from(&request.options),
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn provider_name(&self) -> &'static str {
        "ollama"
    }

    async fn list_models(&self) -> Result<Vec<LlmModelInfo>, LlmError> {
        let url = format!("{}/api/tags", self.config.base_url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            LlmError::ProviderUnavailable(format!("Cannot connect to Ollama: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(LlmError::RequestFailed(
                "Failed to list Ollama models".to_string(),
            ));
        }

        let model_list: OllamaModelList = response
            .json()
            .await
            .map_err(|e| LlmError::RequestFailed(format!("Invalid response: {}", e)))?;

        Ok(model_list
            .models
            .into_iter()
            .map(|m| {
                let description = m.details.as_ref().map(|d| {
                    let mut parts = Vec::new();
                    if let Some(ref family) = d.family {
                        parts.push(family.clone());
                    }
                    if let Some(ref size) = d.parameter_size {
                        parts.push(size.clone());
                    }
                    parts.join(" - ")
                });

                LlmModelInfo {
                    id: m.name.clone(),
                    name: m.name,
                    description,
                    size_bytes: Some(m.size),
                }
            })
            .collect())
    }

    async fn is_ready(&self) -> bool {
        self.check_connection().await.is_ok()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/api/chat", self.config.base_url);
        let ollama_request = Self::build_request(&request, false)?;

        let response = self
            .client
            .post(&url)
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    LlmError::ProviderUnavailable(format!("Cannot connect to Ollama: {}", e))
                } else {
                    LlmError::RequestFailed(format!("Request failed: {}", e))
                }
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LlmError::ModelNotFound(request.model));
        }
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!(
                "Ollama returned error: {}",
                error_text
            )));
        }

        let ollama_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::RequestFailed(format!("Invalid response: {}", e)))?;

        Ok(CompletionResponse {
            content: ollama_response.message.content,
            model: ollama_response.model,
            prompt_tokens: ollama_response.prompt_eval_count,
            completion_tokens: ollama_response.eval_count,
        })
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        callback: StreamCallback,
        cancel_token: Option<tokio_util::sync::CancellationToken>,
    ) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/api/chat", self.config.base_url);
        let model = request.model.clone();
        let ollama_request = Self::build_request(&request, true)?;

        let response = self
            .client
            .post(&url)
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    LlmError::ProviderUnavailable(format!("Cannot connect to Ollama: {}", e))
                } else {
                    LlmError::RequestFailed(format!("Request failed: {}", e))
                }
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LlmError::ModelNotFound(model));
        }
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!(
                "Ollama returned error: {}",
                error_text
            )));
        }

        let mut full_content = String::new();
        let mut prompt_tokens = None;
        let mut completion_tokens = None;

        let mut handle_line = |line: &str| {
            if let Ok(resp) = serde_json::from_str::<OllamaChatResponse>(line) {
                if !resp.message.content.is_empty() {
                    callback(resp.message.content.clone());
                    full_content.push_str(&resp.message.content);
                }

                if resp.done {
                    prompt_tokens = resp.prompt_eval_count;
                    completion_tokens = resp.eval_count;
                }
            }
        };

        // Stream the response: NDJSON, one JSON object per line, with line
        // boundaries independent of network chunk boundaries
        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::new();
        use futures_util::StreamExt;

        while let Some(chunk_result) = stream.next().await {
            if let Some(ref token) = cancel_token {
                if token.is_cancelled() {
                    log::debug!("Streaming completion cancelled");
                    break;
                }
            }

            let chunk = chunk_result
                .map_err(|e| LlmError::RequestFailed(format!("Stream error: {}", e)))?;

            for line in lines.push(&String::from_utf8_lossy(&chunk)) {
                handle_line(&line);
            }
        }

        if let Some(line) = lines.finish() {
            handle_line(&line);
        }

        Ok(CompletionResponse {
            content: full_content,
            model,
            prompt_tokens,
            completion_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_engine::provider::Message;

    #[test]
    fn test_build_request_maps_options() {
        let mut request = CompletionRequest::new("mistral:instruct", vec![Message::user("hi")]);
        request.options.temperature = 0.2;
        request.options.num_ctx = 2048;

        let built = OllamaProvider::build_request(&request, true).unwrap();
        assert_eq!(built.model, "mistral:instruct");
        assert!(built.stream);
        assert_eq!(built.options.temperature, 0.2);
        assert_eq!(built.options.num_ctx, 2048);
        assert_eq!(built.messages[0].role, "user");
    }

    #[test]
    fn test_line_buffer_reassembles_split_objects() {
        let mut lines = LineBuffer::new();

        // One object split across two chunks, a second arriving whole
        assert!(lines.push(r#"{"message":{"role":"assistant","#).is_empty());
        let complete = lines.push("\"content\":\"Hel\"},\"model\":\"m\",\"done\":false}\n");
        assert_eq!(complete.len(), 1);

        let resp: OllamaChatResponse = serde_json::from_str(&complete[0]).unwrap();
        assert_eq!(resp.message.content, "Hel");

        let complete = lines.push(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"model\":\"m\",\"done\":true}\n",
        );
        assert_eq!(complete.len(), 1);
        assert!(lines.finish().is_none());
    }

    #[test]
    fn test_line_buffer_yields_unterminated_tail() {
        let mut lines = LineBuffer::new();
        assert!(lines.push("{\"a\":1}").is_empty());
        assert_eq!(lines.finish().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_line_buffer_skips_blank_lines() {
        let mut lines = LineBuffer::new();
        let complete = lines.push("\n\n{\"a\":1}\n\n{\"b\":2}\n");
        assert_eq!(complete, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_build_request_rejects_empty_model() {
        let request = CompletionRequest::new("  ", vec![Message::user("hi")]);
        assert!(matches!(
            OllamaProvider::build_request(&request, false),
            Err(LlmError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_build_request_rejects_empty_messages() {
        let request = CompletionRequest::new("mistral:instruct", vec![]);
        assert!(matches!(
            OllamaProvider::build_request(&request, false),
            Err(LlmError::InvalidRequest(_))
        ));
    }
}

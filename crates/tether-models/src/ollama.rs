//! Ollama backend.
//!
//! This module provides an implementation of the `ChatBackend` trait for
//! Ollama's local API, in either chat or raw-completion mode.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tether_abstraction::{BackendError, ChatBackend, ChatTurn};
use tracing::{debug, error};

use crate::manifest::{GenerationMode, GenerationOptions};
use crate::transcript;

/// Default Ollama server URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Ollama backend implementation.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    /// `ollama:<model>`, used in logs.
    backend_id: String,
    /// The model ID (e.g., "llama3.2", "codellama:13b").
    model_id: String,
    /// The base URL for the Ollama API.
    base_url: String,
    /// Chat or generate.
    mode: GenerationMode,
    options: GenerationOptions,
    client: Client,
}

impl OllamaBackend {
    /// Creates a new `OllamaBackend` against the default server URL.
    #[must_use]
    pub fn new(model_id: String) -> Self {
        Self::with_base_url(model_id, DEFAULT_OLLAMA_URL.to_string())
    }

    /// Creates a new `OllamaBackend` with a custom base URL.
    #[must_use]
    pub fn with_base_url(model_id: String, base_url: String) -> Self {
        Self {
            backend_id: format!("ollama:{model_id}"),
            model_id,
            base_url: base_url.trim_end_matches('/').to_string(),
            mode: GenerationMode::Chat,
            options: GenerationOptions::default(),
            client: Client::new(),
        }
    }

    /// Sets the generation mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the generation options.
    #[must_use]
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    fn build_options(&self) -> Option<OllamaOptions> {
        if self.options.temperature.is_none() && self.options.max_tokens.is_none() {
            return None;
        }
        Some(OllamaOptions {
            temperature: self.options.temperature,
            num_predict: self.options.max_tokens,
        })
    }

    /// Converts the history into chat messages, stopping at the first
    /// unanswered turn.
    fn to_messages(history: &[ChatTurn]) -> Vec<OllamaMessage> {
        let mut messages = Vec::with_capacity(history.len() * 2);
        for turn in history {
            messages.push(OllamaMessage { role: "user".to_string(), content: turn.prompt.clone() });
            match &turn.answer {
                Some(answer) => messages
                    .push(OllamaMessage { role: "assistant".to_string(), content: answer.clone() }),
                None => break,
            }
        }
        messages
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<reqwest::Response, BackendError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            error!(error = %e, base_url = %self.base_url, "Failed to connect to Ollama");
            if e.is_connect() {
                BackendError::Request(format!(
                    "Ollama server not reachable at {}. Start it with 'ollama serve'.",
                    self.base_url
                ))
            } else {
                BackendError::Request(format!("Network error: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        error!(status = %status, error = %error_text, "Ollama API returned error status");

        if let Ok(error_json) = serde_json::from_str::<OllamaError>(&error_text) {
            if error_json.error.contains("model") && error_json.error.contains("not found") {
                return Err(self.model_not_found());
            }
            if error_json.error.contains("out of memory") || error_json.error.contains("OOM") {
                return Err(BackendError::Response(
                    "Insufficient memory to load model. Try a smaller variant.".to_string(),
                ));
            }
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(self.model_not_found());
        }
        Err(BackendError::Response(format!("API error ({status}): {error_text}")))
    }

    fn model_not_found(&self) -> BackendError {
        BackendError::Response(format!(
            "Model '{}' not found. Pull it with 'ollama pull {}'.",
            self.model_id, self.model_id
        ))
    }

    async fn chat_mode(&self, history: &[ChatTurn]) -> Result<String, BackendError> {
        let request_body = OllamaChatRequest {
            model: self.model_id.clone(),
            messages: Self::to_messages(history),
            stream: false,
            options: self.build_options(),
        };
        let response: OllamaChatResponse = self
            .post("/api/chat", &request_body)
            .await?
            .json()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to parse Ollama chat response");
                BackendError::Serialization(format!("Failed to parse response: {e}"))
            })?;
        Ok(response.message.content)
    }

    async fn generate_mode(&self, history: &[ChatTurn]) -> Result<String, BackendError> {
        let request_body = OllamaGenerateRequest {
            model: self.model_id.clone(),
            prompt: transcript::render(history),
            stream: false,
            options: self.build_options(),
        };
        let response: OllamaGenerateResponse = self
            .post("/api/generate", &request_body)
            .await?
            .json()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to parse Ollama generate response");
                BackendError::Serialization(format!("Failed to parse response: {e}"))
            })?;
        Ok(transcript::extract_reply(&response.response).to_string())
    }
}

// Ollama API request/response structures
#[derive(Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>, // max_tokens equivalent
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct OllamaError {
    error: String,
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    async fn chat(&self, history: &[ChatTurn]) -> Result<String, BackendError> {
        debug!(
            model_id = %self.model_id,
            turns = history.len(),
            mode = ?self.mode,
            "OllamaBackend answering"
        );
        match self.mode {
            GenerationMode::Chat => self.chat_mode(history).await,
            GenerationMode::Generate => self.generate_mode(history).await,
        }
    }

    fn backend_id(&self) -> &str {
        &self.backend_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_backend_new() {
        let backend = OllamaBackend::new("llama3.2".to_string());
        assert_eq!(backend.backend_id(), "ollama:llama3.2");
        assert_eq!(backend.base_url, DEFAULT_OLLAMA_URL);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let backend =
            OllamaBackend::with_base_url("llama3.2".to_string(), "http://10.0.0.2:11434/".to_string());
        assert_eq!(backend.base_url, "http://10.0.0.2:11434");
    }

    #[test]
    fn test_to_messages_stops_at_unanswered_turn() {
        let history = vec![
            ChatTurn::answered("hello", "hi there"),
            ChatTurn::prompt("joke please"),
            ChatTurn::answered("ignored", "ignored"),
        ];
        let messages = OllamaBackend::to_messages(&history);
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
        assert_eq!(messages[2].content, "joke please");
    }

    #[test]
    fn test_options_omitted_when_unset() {
        let backend = OllamaBackend::new("llama3.2".to_string());
        assert!(backend.build_options().is_none());
        let backend = backend.with_options(GenerationOptions { temperature: Some(0.1), max_tokens: None });
        assert!(backend.build_options().is_some());
    }
}

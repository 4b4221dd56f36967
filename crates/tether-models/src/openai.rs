//! OpenAI-compatible backend.
//!
//! This module provides an implementation of the `ChatBackend` trait for the
//! OpenAI chat completions API and servers that mimic it (vLLM, LocalAI,
//! LM Studio, ...).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tether_abstraction::{BackendError, ChatBackend, ChatTurn};
use tracing::{debug, error};

use crate::manifest::GenerationOptions;

/// Default OpenAI API base URL.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Environment variable consulted for the API key when a manifest names none.
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// OpenAI-compatible backend implementation.
#[derive(Debug, Clone)]
pub struct OpenAIBackend {
    backend_id: String,
    /// The model ID (e.g., "gpt-4o-mini").
    model_id: String,
    /// The API key, absent for local servers without auth.
    api_key: Option<String>,
    /// The base URL of the API, without the `/chat/completions` suffix.
    base_url: String,
    options: GenerationOptions,
    client: Client,
}

impl OpenAIBackend {
    /// Creates a backend against `base_url` with an optional API key.
    #[must_use]
    pub fn new(model_id: String, base_url: String, api_key: Option<String>) -> Self {
        Self {
            backend_id: format!("openai:{model_id}"),
            model_id,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            options: GenerationOptions::default(),
            client: Client::new(),
        }
    }

    /// Sets the generation options.
    #[must_use]
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Converts the history into role-tagged messages. Every answered turn
    /// contributes a user and an assistant message; conversion stops after
    /// the first unanswered turn.
    fn to_messages(history: &[ChatTurn]) -> Vec<OpenAIMessage> {
        let mut messages = Vec::with_capacity(history.len() * 2);
        for turn in history {
            messages.push(OpenAIMessage { role: "user".to_string(), content: turn.prompt.clone() });
            let Some(answer) = &turn.answer else { break };
            messages.push(OpenAIMessage { role: "assistant".to_string(), content: answer.clone() });
        }
        messages
    }
}

#[async_trait]
impl ChatBackend for OpenAIBackend {
    async fn chat(&self, history: &[ChatTurn]) -> Result<String, BackendError> {
        debug!(
            model_id = %self.model_id,
            turns = history.len(),
            "OpenAIBackend answering"
        );

        let url = format!("{}/chat/completions", self.base_url);
        let request_body = OpenAIRequest {
            model: self.model_id.clone(),
            messages: Self::to_messages(history),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        let mut request = self.client.post(&url).json(&request_body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }
        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Failed to send request to OpenAI-compatible API");
            BackendError::Request(format!("Network error: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                status = %status,
                error = %error_text,
                "OpenAI-compatible API returned error status"
            );
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status == reqwest::StatusCode::PAYMENT_REQUIRED
            {
                return Err(BackendError::Response(format!(
                    "Quota or rate limit exceeded ({status}): {error_text}"
                )));
            }
            return Err(BackendError::Response(format!("API error ({status}): {error_text}")));
        }

        let openai_response: OpenAIResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse OpenAI-compatible API response");
            BackendError::Serialization(format!("Failed to parse response: {e}"))
        })?;

        openai_response.choices.into_iter().next().map(|c| c.message.content).ok_or_else(|| {
            error!("No content in OpenAI-compatible API response");
            BackendError::Response("No content in API response".to_string())
        })
    }

    fn backend_id(&self) -> &str {
        &self.backend_id
    }
}

// OpenAI API request/response structures

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

//! Backend abstraction layer for Tether.
//!
//! This module defines the chat history type every backend consumes and the
//! single entry point a backend exposes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents an error that can occur when resolving or calling a chat backend.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendError {
    /// No backend with the requested name exists.
    #[error("Backend not found: {0}")]
    NotFound(String),

    /// The backend exists but cannot be turned into a callable chat function.
    #[error("Invalid backend '{name}': {reason}")]
    Invalid {
        /// The requested backend name.
        name: String,
        /// Why the backend could not be built.
        reason: String,
    },

    /// An error occurred during the upstream request (e.g., network issues).
    #[error("Request Error: {0}")]
    Request(String),

    /// The upstream model returned an error (e.g., invalid input, rate limiting).
    #[error("Response Error: {0}")]
    Response(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization Error: {0}")]
    Serialization(String),

    /// Other unexpected errors.
    #[error("Other Backend Error: {0}")]
    Other(String),
}

impl BackendError {
    /// Shorthand for an [`BackendError::Invalid`] error.
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid { name: name.into(), reason: reason.into() }
    }
}

/// One exchange in a chat history.
///
/// The last turn of a history carries a prompt and no answer; that is the
/// prompt the backend is asked to answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// What the user said.
    pub prompt: String,
    /// What the assistant answered, if this turn has been answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl ChatTurn {
    /// Creates an unanswered turn.
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), answer: None }
    }

    /// Creates an answered turn (a few-shot example or earlier exchange).
    pub fn answered(prompt: impl Into<String>, answer: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), answer: Some(answer.into()) }
    }
}

/// The prompt carried by an inbound call: either a bare string or a full
/// chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    /// A single prompt with no prior context.
    Text(String),
    /// An ordered chat history ending with an unanswered turn.
    History(Vec<ChatTurn>),
}

impl Prompt {
    /// Converts the prompt into the history form every backend consumes.
    #[must_use]
    pub fn into_history(self) -> Vec<ChatTurn> {
        match self {
            Self::Text(text) => vec![ChatTurn::prompt(text)],
            Self::History(turns) => turns,
        }
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Returns the prompt the backend should answer: the last turn's prompt.
#[must_use]
pub fn pending_prompt(history: &[ChatTurn]) -> Option<&str> {
    history.last().map(|turn| turn.prompt.as_str())
}

/// A chat backend: given a history, produce the next answer.
///
/// All backends must be `Send + Sync` so one instance can be cached and
/// called from any request task.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Answers the last turn of `history`.
    ///
    /// # Errors
    /// Returns a `BackendError` if the upstream call fails.
    async fn chat(&self, history: &[ChatTurn]) -> Result<String, BackendError>;

    /// Returns an identifier for the backend instance (kind and model).
    fn backend_id(&self) -> &str;
}

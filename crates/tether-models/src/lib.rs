//! Backend implementations and the backend loader for Tether.
//!
//! This crate provides concrete implementations of the `ChatBackend` trait
//! and the [`BackendRegistry`] that resolves a backend name to a fresh
//! instance.
//!
//! # Supported Kinds
//!
//! - **echo**: Answers with the pending prompt (testing)
//! - **mock**: Deterministic summary of the history (testing and development)
//! - **ollama**: Local models via Ollama (chat or raw completion)
//! - **openai**: OpenAI and OpenAI-compatible servers

pub mod listing;
pub mod manifest;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod transcript;

use async_trait::async_trait;
use std::fmt::Write;
use tether_abstraction::{BackendError, ChatBackend, ChatTurn, pending_prompt};
use tracing::debug;

pub use listing::{BackendListing, list_backends};
pub use manifest::{BackendManifest, GenerationMode, GenerationOptions};
pub use ollama::OllamaBackend;
pub use openai::OpenAIBackend;
pub use registry::{BackendFactory, BackendLoader, BackendRegistry};

/// A backend that answers with the pending prompt unchanged.
#[derive(Debug, Clone)]
pub struct EchoBackend {
    id: String,
}

impl EchoBackend {
    /// Creates a new `EchoBackend` with the given ID.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self { id }
    }
}

#[async_trait]
impl ChatBackend for EchoBackend {
    async fn chat(&self, history: &[ChatTurn]) -> Result<String, BackendError> {
        pending_prompt(history)
            .map(ToString::to_string)
            .ok_or_else(|| BackendError::Other("empty chat history".to_string()))
    }

    fn backend_id(&self) -> &str {
        &self.id
    }
}

/// A mock implementation of the `ChatBackend` trait for testing and demonstration.
#[derive(Debug, Default, Clone)]
pub struct MockBackend {
    id: String,
}

impl MockBackend {
    /// Creates a new `MockBackend` with the given ID.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self { id }
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn chat(&self, history: &[ChatTurn]) -> Result<String, BackendError> {
        debug!(
            backend_id = %self.id,
            turns = history.len(),
            "MockBackend answering"
        );

        let Some(prompt) = pending_prompt(history) else {
            return Err(BackendError::Other("empty chat history".to_string()));
        };

        let mut response = format!("Mock response from {} for: {prompt}", self.id);
        let earlier = history.len() - 1;
        if earlier > 0 {
            let _ = write!(response, " ({earlier} earlier turns)");
        }
        Ok(response)
    }

    fn backend_id(&self) -> &str {
        &self.id
    }
}

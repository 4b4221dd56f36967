//! Backend manifests.
//!
//! Each backend in the backends directory is a TOML file named
//! `<backend-name>.toml` that names the backend kind and its settings:
//!
//! ```toml
//! kind = "ollama"
//! model = "llama3.2"
//! base_url = "http://localhost:11434"
//! mode = "chat"
//!
//! [options]
//! temperature = 0.2
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tether_abstraction::BackendError;

/// File extension of backend manifests.
pub const MANIFEST_EXTENSION: &str = "toml";

/// How a completion-style backend turns a history into a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Send the turns as role-tagged chat messages.
    #[default]
    Chat,
    /// Render a `Human:`/`Assistant:` transcript and ask for a raw completion.
    Generate,
}

/// Generation options shared by the remote backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Maximum number of tokens to generate.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// A parsed backend manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendManifest {
    /// Backend kind, used to pick the factory (e.g. `ollama`, `openai`, `echo`).
    pub kind: String,
    /// Upstream model identifier.
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL of the upstream API.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Request style for backends that support both.
    #[serde(default)]
    pub mode: GenerationMode,
    /// Generation options.
    #[serde(default)]
    pub options: GenerationOptions,
}

impl BackendManifest {
    /// Creates a manifest for the given kind with every other field defaulted.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            model: None,
            base_url: None,
            api_key_env: None,
            mode: GenerationMode::default(),
            options: GenerationOptions::default(),
        }
    }

    /// Sets the upstream model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the upstream base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the generation mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Parses a manifest from TOML text.
    ///
    /// # Errors
    /// Returns `BackendError::Invalid` if the text is not a valid manifest.
    pub fn parse(name: &str, content: &str) -> Result<Self, BackendError> {
        toml::from_str(content)
            .map_err(|e| BackendError::invalid(name, format!("malformed manifest: {e}")))
    }

    /// Reads and parses the manifest at `path`.
    ///
    /// # Errors
    /// Returns `BackendError::NotFound` if the file does not exist and
    /// `BackendError::Invalid` if it cannot be read or parsed.
    pub fn load(name: &str, path: &Path) -> Result<Self, BackendError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackendError::NotFound(name.to_string())
            } else {
                BackendError::invalid(name, format!("cannot read {}: {e}", path.display()))
            }
        })?;
        Self::parse(name, &content)
    }

    /// Returns the model identifier, or an `Invalid` error naming the backend.
    ///
    /// # Errors
    /// Returns `BackendError::Invalid` if the manifest has no `model`.
    pub fn require_model(&self, name: &str) -> Result<&str, BackendError> {
        self.model
            .as_deref()
            .ok_or_else(|| BackendError::invalid(name, format!("'{}' backends need a model", self.kind)))
    }
}

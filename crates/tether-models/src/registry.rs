//! Backend registry: resolves a backend name to a fresh backend instance.
//!
//! Backends are described by manifests in a backends directory (see
//! [`crate::manifest`]). The registry keeps one factory per backend *kind* and
//! re-reads the manifest on every resolution, so manifest edits take effect
//! on the next cache miss without a restart.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tether_abstraction::{BackendError, ChatBackend};
use tracing::{debug, info, warn};

use crate::manifest::{BackendManifest, MANIFEST_EXTENSION};
use crate::ollama::DEFAULT_OLLAMA_URL;
use crate::openai::{DEFAULT_API_KEY_ENV, DEFAULT_OPENAI_URL};
use crate::{EchoBackend, MockBackend, OllamaBackend, OpenAIBackend};

/// Builds a backend from its name and manifest.
pub type BackendFactory =
    Arc<dyn Fn(&str, &BackendManifest) -> Result<Arc<dyn ChatBackend>, BackendError> + Send + Sync>;

type StaticFactory = Arc<dyn Fn() -> Result<Arc<dyn ChatBackend>, BackendError> + Send + Sync>;

/// Resolves backend names to callable backends.
///
/// Every call must produce a new instance; callers own caching.
pub trait BackendLoader: Send + Sync {
    /// Resolves `name` to a fresh backend.
    ///
    /// # Errors
    /// Returns `BackendError::NotFound` if no backend has that name and
    /// `BackendError::Invalid` if it exists but cannot be built.
    fn resolve(&self, name: &str) -> Result<Arc<dyn ChatBackend>, BackendError>;
}

/// Built-in backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Answers with the pending prompt.
    Echo,
    /// Deterministic mock answers.
    Mock,
    /// Ollama local server.
    Ollama,
    /// OpenAI or an OpenAI-compatible server.
    OpenAI,
}

impl BackendKind {
    /// All built-in kinds.
    pub const ALL: [Self; 4] = [Self::Echo, Self::Mock, Self::Ollama, Self::OpenAI];

    /// Canonical kind name as written in manifests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::Mock => "mock",
            Self::Ollama => "ollama",
            Self::OpenAI => "openai",
        }
    }

    fn factory(self) -> BackendFactory {
        match self {
            Self::Echo => Arc::new(build_echo),
            Self::Mock => Arc::new(build_mock),
            Self::Ollama => Arc::new(build_ollama),
            Self::OpenAI => Arc::new(build_openai),
        }
    }
}

impl FromStr for BackendKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "echo" => Ok(Self::Echo),
            "mock" => Ok(Self::Mock),
            "ollama" => Ok(Self::Ollama),
            "openai" | "openai-compatible" | "universal" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

fn build_echo(name: &str, _manifest: &BackendManifest) -> Result<Arc<dyn ChatBackend>, BackendError> {
    Ok(Arc::new(EchoBackend::new(name.to_string())))
}

fn build_mock(name: &str, manifest: &BackendManifest) -> Result<Arc<dyn ChatBackend>, BackendError> {
    let id = manifest.model.clone().unwrap_or_else(|| name.to_string());
    Ok(Arc::new(MockBackend::new(id)))
}

fn build_ollama(name: &str, manifest: &BackendManifest) -> Result<Arc<dyn ChatBackend>, BackendError> {
    let model = manifest.require_model(name)?.to_string();
    let base_url = manifest.base_url.clone().unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
    Ok(Arc::new(
        OllamaBackend::with_base_url(model, base_url)
            .with_mode(manifest.mode)
            .with_options(manifest.options.clone()),
    ))
}

#[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
fn build_openai(name: &str, manifest: &BackendManifest) -> Result<Arc<dyn ChatBackend>, BackendError> {
    let model = manifest.require_model(name)?.to_string();
    let key_env = manifest.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
    let api_key = std::env::var(key_env).ok();

    let base_url = match &manifest.base_url {
        Some(url) => url.clone(),
        None if api_key.is_none() => {
            return Err(BackendError::invalid(
                name,
                format!("{key_env} environment variable not set"),
            ));
        }
        None => DEFAULT_OPENAI_URL.to_string(),
    };

    Ok(Arc::new(
        OpenAIBackend::new(model, base_url, api_key).with_options(manifest.options.clone()),
    ))
}

/// Strips a manifest extension and rejects names that could escape the
/// backends directory.
///
/// # Errors
/// Returns `BackendError::Invalid` for empty names or names with path
/// components.
pub fn normalize_name(name: &str) -> Result<&str, BackendError> {
    let trimmed = name.trim();
    let stem = trimmed
        .strip_suffix(MANIFEST_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(trimmed);

    if stem.is_empty() {
        return Err(BackendError::invalid(name, "empty backend name"));
    }
    if stem.contains(['/', '\\']) || stem.starts_with('.') {
        return Err(BackendError::invalid(name, "backend names cannot contain path components"));
    }
    Ok(stem)
}

/// The production [`BackendLoader`]: a directory of manifests plus a table of
/// kind factories.
pub struct BackendRegistry {
    dir: PathBuf,
    kinds: HashMap<String, BackendFactory>,
    statics: HashMap<String, StaticFactory>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.kinds.keys().collect();
        kinds.sort();
        let mut statics: Vec<&String> = self.statics.keys().collect();
        statics.sort();
        f.debug_struct("BackendRegistry")
            .field("dir", &self.dir)
            .field("kinds", &kinds)
            .field("statics", &statics)
            .finish()
    }
}

impl BackendRegistry {
    /// Creates a registry over `dir` with the built-in kinds registered.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let kinds = BackendKind::ALL
            .iter()
            .map(|kind| (kind.as_str().to_string(), kind.factory()))
            .collect();
        Self { dir: dir.into(), kinds, statics: HashMap::new() }
    }

    /// The directory manifests are read from.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Registers (or replaces) the factory for a backend kind.
    pub fn register_kind<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&str, &BackendManifest) -> Result<Arc<dyn ChatBackend>, BackendError>
            + Send
            + Sync
            + 'static,
    {
        self.kinds.insert(kind.into().to_lowercase(), Arc::new(factory));
    }

    /// Registers a backend by name without a manifest. Static registrations
    /// take precedence over manifests of the same name.
    pub fn register_static<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn ChatBackend>, BackendError> + Send + Sync + 'static,
    {
        self.statics.insert(name.into(), Arc::new(factory));
    }

    /// Builds a backend from an in-memory manifest.
    ///
    /// # Errors
    /// Returns `BackendError::Invalid` if no factory handles the manifest's
    /// kind, or whatever the factory returns.
    pub fn build(&self, name: &str, manifest: &BackendManifest) -> Result<Arc<dyn ChatBackend>, BackendError> {
        let kind = manifest.kind.to_lowercase();
        let factory = self.kinds.get(&kind).cloned().or_else(|| {
            BackendKind::from_str(&kind).ok().and_then(|k| self.kinds.get(k.as_str()).cloned())
        });
        let Some(factory) = factory else {
            return Err(BackendError::invalid(name, format!("unknown backend kind '{}'", manifest.kind)));
        };
        factory(name, manifest)
    }

    /// Enumerates the backend names currently available: static
    /// registrations plus every manifest in the directory, sorted.
    ///
    /// # Errors
    /// Returns an I/O error if the directory exists but cannot be read.
    pub fn scan(&self) -> std::io::Result<Vec<String>> {
        let mut names: Vec<String> = self.statics.keys().cloned().collect();

        match std::fs::read_dir(&self.dir) {
            Ok(entries) => {
                for entry in entries {
                    let path = entry?.path();
                    if !path.is_file()
                        || path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXTENSION)
                    {
                        continue;
                    }
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        names.push(stem.to_string());
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %self.dir.display(), "Backends directory does not exist");
            }
            Err(e) => return Err(e),
        }

        names.sort();
        names.dedup();
        info!(dir = %self.dir.display(), count = names.len(), backends = ?names, "Scanned backends");
        Ok(names)
    }
}

impl BackendLoader for BackendRegistry {
    fn resolve(&self, name: &str) -> Result<Arc<dyn ChatBackend>, BackendError> {
        let name = normalize_name(name)?;
        debug!(backend = %name, "Resolving backend");

        if let Some(factory) = self.statics.get(name) {
            return factory();
        }

        let path = self.dir.join(format!("{name}.{MANIFEST_EXTENSION}"));
        let manifest = BackendManifest::load(name, &path)?;
        let backend = self.build(name, &manifest)?;

        info!(
            backend = %name,
            kind = %manifest.kind,
            backend_id = %backend.backend_id(),
            "Backend resolved"
        );
        Ok(backend)
    }
}

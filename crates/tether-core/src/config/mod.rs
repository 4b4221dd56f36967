//! Configuration module for Tether Core.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::cache::CacheConfig;
use crate::error::{CoreError, Result};

/// Port the HTTP server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 4410;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "tether.toml";

/// Server configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// The address to bind the HTTP server to.
    #[serde(default = "default_address")]
    pub address: SocketAddr,
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: default_address() }
    }
}

/// Where backend manifests live.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BackendsConfig {
    /// Directory holding one `<name>.toml` manifest per backend.
    #[serde(default = "default_backends_dir")]
    pub dir: PathBuf,
}

fn default_backends_dir() -> PathBuf {
    PathBuf::from("./backends")
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self { dir: default_backends_dir() }
    }
}

/// Root configuration for Tether.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Session cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Backend directory configuration.
    #[serde(default)]
    pub backends: BackendsConfig,
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`] is
    /// read if present and defaults are used otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    debug!(file = DEFAULT_CONFIG_FILE, "No config file found, using defaults");
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            CoreError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(file = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns an error if a cache setting is out of range or the backends
    /// directory is empty.
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        if self.backends.dir.as_os_str().is_empty() {
            return Err(CoreError::Config("backends.dir must not be empty".to_string()));
        }
        Ok(())
    }

    /// Overrides the listening port, keeping the configured interface.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.server.address.set_port(port);
        self
    }

    /// Overrides the backends directory.
    #[must_use]
    pub fn with_backends_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backends.dir = dir.into();
        self
    }
}

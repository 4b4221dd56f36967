//! Error types for Tether Core.

use thiserror::Error;

use crate::cache::CacheConfigError;

/// Core error type for Tether operations outside the request path.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid cache settings
    #[error("Cache configuration error: {0}")]
    CacheConfig(#[from] CacheConfigError),

    /// TOML parsing errors
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Address parsing errors
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tether Core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

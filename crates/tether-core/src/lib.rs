//! Tether Core - Session-scoped chat backend cache and HTTP server.
//!
//! This crate provides the core functionality for Tether, including:
//! - the session cache and its idle reaper
//! - HTTP server for client communication
//! - Configuration management
//! - Error handling
//!
//! # Example
//!
//! ```rust,no_run
//! use tether_core::{config::Config, server};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> tether_core::error::Result<()> {
//!     let config = Config::load(None)?;
//!     server::run(&config, CancellationToken::new()).await
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod server;

pub use cache::{
    CacheConfig, CacheConfigError, CacheError, CacheStats, ChatRequest, SessionCache, SessionHandle, SessionInfo,
};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::Config;
pub use error::{CoreError, Result};
pub use server::AppState;

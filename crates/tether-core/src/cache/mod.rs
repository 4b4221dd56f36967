//! Session cache: one backend handle per session id.
//!
//! A handle is created lazily on the first call for a session by resolving a
//! backend name through a [`tether_models::BackendLoader`], reused by later
//! calls, and dropped on explicit termination or once it has been idle longer
//! than the configured timeout.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tether_core::cache::{CacheConfig, ChatRequest, SessionCache};
//! use tether_models::BackendRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(BackendRegistry::new("./backends"));
//! let cache = SessionCache::new(registry, CacheConfig::default())?;
//!
//! let answer = cache.chat(ChatRequest::new("p1", "echo", "hi")).await?;
//! assert_eq!(answer, "hi");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod session_cache;
pub mod types;

pub use config::{CacheConfig, CacheConfigError};
pub use error::CacheError;
pub use session_cache::SessionCache;
pub use types::{CacheStats, ChatRequest, SessionHandle, SessionInfo};

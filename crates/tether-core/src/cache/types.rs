//! Core data types for the session cache.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tether_abstraction::{ChatBackend, Prompt};
use tokio::time::Instant;
use uuid::Uuid;

/// A resolved backend as handed out by the cache.
///
/// Cloning is cheap; every clone refers to the same backend instance and
/// carries the `handle_id` of the cache entry it came from.
#[derive(Clone)]
pub struct SessionHandle {
    handle_id: Uuid,
    backend_name: String,
    backend: Arc<dyn ChatBackend>,
}

impl SessionHandle {
    pub(crate) fn new(backend_name: &str, backend: Arc<dyn ChatBackend>) -> Self {
        Self { handle_id: Uuid::new_v4(), backend_name: backend_name.to_string(), backend }
    }

    /// Unique id of this handle; a re-created session gets a new one.
    #[must_use]
    pub const fn handle_id(&self) -> Uuid {
        self.handle_id
    }

    /// The backend name the handle was resolved from.
    #[must_use]
    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// The backend instance.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("handle_id", &self.handle_id)
            .field("backend_name", &self.backend_name)
            .field("backend_id", &self.backend.backend_id())
            .finish()
    }
}

/// A cache entry: the handle plus idle-tracking metadata.
#[derive(Debug)]
pub(crate) struct CacheEntry {
    pub handle: SessionHandle,
    pub created_at: Instant,
    pub last_used: Instant,
    pub invocations: u64,
}

impl CacheEntry {
    pub fn new(handle: SessionHandle, now: Instant) -> Self {
        Self { handle, created_at: now, last_used: now, invocations: 0 }
    }

    /// Refreshes `last_used`, never moving it backwards.
    pub fn touch(&mut self, now: Instant) {
        self.last_used = self.last_used.max(now);
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used)
    }
}

/// A snapshot of one cached session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// The session id.
    pub process_id: String,
    /// Id of the cached handle.
    pub handle_id: Uuid,
    /// Backend the handle was resolved from.
    pub backend_name: String,
    /// Time since the session was created.
    pub age: Duration,
    /// Time since the session was last used.
    pub idle: Duration,
    /// Successful invocations served by this handle.
    pub invocations: u64,
}

/// Cache statistics for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that found a live handle.
    pub total_hits: u64,
    /// Lookups that had to resolve a backend.
    pub total_misses: u64,
    /// Resolutions that failed (never cached).
    pub failed_resolutions: u64,
    /// Backend calls that returned an error.
    pub failed_invocations: u64,
    /// Sessions removed by explicit termination.
    pub total_terminations: u64,
    /// Sessions removed by idle reclamation.
    pub total_reclaimed: u64,
    /// Current number of cached sessions.
    pub cache_size: usize,
}

/// One inbound chat call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Session id.
    pub process_id: String,
    /// Backend to resolve if the session has no handle yet.
    pub model_name: String,
    /// Prompt text or chat history.
    pub prompt: Prompt,
    /// Terminate the session once this call returns.
    #[serde(default)]
    pub finish_flag: bool,
}

impl ChatRequest {
    /// Creates a request with `finish_flag` unset.
    pub fn new(
        process_id: impl Into<String>,
        model_name: impl Into<String>,
        prompt: impl Into<Prompt>,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            model_name: model_name.into(),
            prompt: prompt.into(),
            finish_flag: false,
        }
    }

    /// Sets the finish flag.
    #[must_use]
    pub const fn finishing(mut self) -> Self {
        self.finish_flag = true;
        self
    }
}

//! SessionCache implementation: one lazily resolved backend handle per
//! session, reclaimed when idle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tether_abstraction::ChatTurn;
use tether_models::BackendLoader;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::{CacheConfig, CacheConfigError};
use super::error::CacheError;
use super::types::{CacheEntry, CacheStats, ChatRequest, SessionHandle, SessionInfo};
use crate::clock::{Clock, TokioClock};

/// Everything behind the cache guard.
#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

impl CacheState {
    fn sync_size(&mut self) {
        self.stats.cache_size = self.entries.len();
    }
}

/// Session cache.
///
/// Maps a session id (`process_id`) to at most one backend handle. The map is
/// guarded by a single mutex held only for lookups, inserts, removals,
/// timestamp refreshes and backend resolution; backend calls run outside it.
pub struct SessionCache {
    loader: Arc<dyn BackendLoader>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("loader", &"<BackendLoader>")
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionCache {
    /// Create a new session cache on the runtime clock.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if the configuration is invalid.
    pub fn new(loader: Arc<dyn BackendLoader>, config: CacheConfig) -> Result<Self, CacheConfigError> {
        Self::with_clock(loader, config, Arc::new(TokioClock))
    }

    /// Create a new session cache reading time from `clock`.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if the configuration is invalid.
    pub fn with_clock(
        loader: Arc<dyn BackendLoader>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheConfigError> {
        config.validate()?;
        Ok(Self { loader, clock, config, state: Mutex::new(CacheState::default()) })
    }

    /// Get the cache configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the handle for `process_id`, resolving `model_name` if the
    /// session has none.
    ///
    /// The guard is held across the whole check-resolve-insert sequence, so
    /// concurrent callers for one session share a single resolution. On a hit
    /// `model_name` is ignored and `last_used` is refreshed.
    ///
    /// # Errors
    /// Returns `CacheError::BackendNotFound` or `CacheError::BackendInvalid`
    /// if resolution fails; nothing is cached in that case.
    pub async fn get_or_create(&self, process_id: &str, model_name: &str) -> Result<SessionHandle, CacheError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = self.clock.now();

        if let Some(entry) = state.entries.get_mut(process_id) {
            entry.touch(now);
            state.stats.total_hits += 1;
            debug!(
                process_id = %process_id,
                handle_id = %entry.handle.handle_id(),
                "Cache hit"
            );
            return Ok(entry.handle.clone());
        }

        state.stats.total_misses += 1;
        debug!(process_id = %process_id, backend = %model_name, "Cache miss, resolving backend");

        // Resolution reads the manifest from disk while the guard is held, so
        // every other lookup waits for it. Keep loaders cheap.
        let backend = match self.loader.resolve(model_name) {
            Ok(backend) => backend,
            Err(e) => {
                state.stats.failed_resolutions += 1;
                warn!(
                    process_id = %process_id,
                    backend = %model_name,
                    error = %e,
                    "Backend resolution failed"
                );
                return Err(CacheError::resolution(model_name, e));
            }
        };

        let handle = SessionHandle::new(model_name, backend);
        state.entries.insert(process_id.to_string(), CacheEntry::new(handle.clone(), now));
        state.sync_size();

        info!(
            process_id = %process_id,
            backend = %model_name,
            handle_id = %handle.handle_id(),
            backend_id = %handle.backend().backend_id(),
            "Session created"
        );
        Ok(handle)
    }

    /// Calls `handle` with `history` outside the guard.
    ///
    /// On success the session's `last_used` is refreshed, provided the entry
    /// still holds this handle. On failure the handle stays cached unless
    /// `evict_on_error` is set.
    ///
    /// # Errors
    /// Returns `CacheError::BackendExecution` carrying the backend's message.
    pub async fn invoke(
        &self,
        process_id: &str,
        handle: &SessionHandle,
        history: &[ChatTurn],
    ) -> Result<String, CacheError> {
        let result = handle.backend().chat(history).await;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = self.clock.now();
        let current = state
            .entries
            .get_mut(process_id)
            .filter(|entry| entry.handle.handle_id() == handle.handle_id());

        match result {
            Ok(answer) => {
                if let Some(entry) = current {
                    entry.touch(now);
                    entry.invocations += 1;
                }
                Ok(answer)
            }
            Err(e) => {
                state.stats.failed_invocations += 1;
                warn!(
                    process_id = %process_id,
                    handle_id = %handle.handle_id(),
                    error = %e,
                    "Backend call failed"
                );
                if self.config.evict_on_error && current.is_some() {
                    state.entries.remove(process_id);
                    state.sync_size();
                    info!(process_id = %process_id, "Evicted session after backend failure");
                }
                Err(CacheError::execution(process_id, &e))
            }
        }
    }

    /// Serves one inbound chat call: look up or create the handle, call it,
    /// then terminate the session if `finish_flag` is set. Termination happens
    /// whether the call succeeded or failed.
    ///
    /// # Errors
    /// Returns resolution errors from [`Self::get_or_create`] and execution
    /// errors from [`Self::invoke`].
    pub async fn chat(&self, request: ChatRequest) -> Result<String, CacheError> {
        let ChatRequest { process_id, model_name, prompt, finish_flag } = request;

        let handle = self.get_or_create(&process_id, &model_name).await?;
        let result = self.invoke(&process_id, &handle, &prompt.into_history()).await;

        if finish_flag {
            self.terminate(&process_id).await;
        }
        result
    }

    /// Removes the session's handle. Returns whether one was present;
    /// terminating an unknown session is a no-op.
    pub async fn terminate(&self, process_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(entry) = state.entries.remove(process_id) else {
            debug!(process_id = %process_id, "Terminate for unknown session ignored");
            return false;
        };
        state.stats.total_terminations += 1;
        state.sync_size();
        info!(
            process_id = %process_id,
            handle_id = %entry.handle.handle_id(),
            invocations = entry.invocations,
            "Session terminated"
        );
        true
    }

    /// Removes every session idle for longer than `threshold`. Returns the
    /// number of sessions removed.
    pub async fn reclaim_idle(&self, threshold: Duration) -> usize {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = self.clock.now();
        let before = state.entries.len();

        state.entries.retain(|process_id, entry| {
            let idle = entry.idle_for(now);
            if idle <= threshold {
                return true;
            }
            info!(
                process_id = %process_id,
                handle_id = %entry.handle.handle_id(),
                idle_secs = idle.as_secs(),
                "Reclaimed idle session"
            );
            false
        });

        let reclaimed = before - state.entries.len();
        state.stats.total_reclaimed += reclaimed as u64;
        state.sync_size();
        reclaimed
    }

    /// Runs [`Self::reclaim_idle`] every `interval` until `cancel` fires.
    pub async fn run_reaper(&self, interval: Duration, threshold: Duration, cancel: CancellationToken) {
        let Some(first_tick) = tokio::time::Instant::now().checked_add(interval) else {
            warn!(interval_secs = interval.as_secs(), "Reap interval out of range, session reaper not started");
            return;
        };
        let mut ticker = tokio::time::interval_at(first_tick, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = interval.as_secs(),
            threshold_secs = threshold.as_secs(),
            "Session reaper started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Session reaper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let reclaimed = self.reclaim_idle(threshold).await;
                    debug!(reclaimed, "Reaper pass complete");
                }
            }
        }
    }

    /// Spawns the reaper with the configured interval and idle timeout.
    pub fn spawn_reaper(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let interval = self.config.reap_interval();
        let threshold = self.config.idle_timeout();
        tokio::spawn(async move { self.run_reaper(interval, threshold, cancel).await })
    }

    /// Drops every cached handle. Returns how many were dropped.
    pub async fn clear(&self) -> usize {
        let mut state = self.state.lock().await;
        let cleared = state.entries.len();
        state.entries.clear();
        state.sync_size();
        info!(cleared, "Cleared all sessions");
        cleared
    }

    /// Returns `true` if `process_id` has a cached handle.
    pub async fn contains(&self, process_id: &str) -> bool {
        self.state.lock().await.entries.contains_key(process_id)
    }

    /// Number of cached sessions.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Returns `true` if no session is cached.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Ids of the cached sessions, sorted.
    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().await.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of one session, without refreshing it.
    pub async fn session_info(&self, process_id: &str) -> Option<SessionInfo> {
        let state = self.state.lock().await;
        let now = self.clock.now();
        state.entries.get(process_id).map(|entry| SessionInfo {
            process_id: process_id.to_string(),
            handle_id: entry.handle.handle_id(),
            backend_name: entry.handle.backend_name().to_string(),
            age: now.saturating_duration_since(entry.created_at),
            idle: entry.idle_for(now),
            invocations: entry.invocations,
        })
    }

    /// Get current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats.clone()
    }
}

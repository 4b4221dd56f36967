//! Integration tests for the session cache over a real backend registry.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{CountingLoader, FAILING_BACKEND, backends_dir, default_backends, registry};
use tether_abstraction::{ChatTurn, Prompt};
use tether_core::{CacheConfig, CacheError, ChatRequest, ManualClock, SessionCache};
use tether_models::BackendLoader;

fn cache_over(dir: &std::path::Path, config: CacheConfig) -> SessionCache {
    SessionCache::new(Arc::new(registry(dir)), config).unwrap()
}

#[tokio::test]
async fn test_echo_session_answers_then_finishes() {
    let dir = default_backends();
    let cache = cache_over(dir.path(), CacheConfig::default());

    let answer = cache.chat(ChatRequest::new("p1", "echo", "hi")).await.unwrap();
    assert_eq!(answer, "hi");
    assert!(cache.contains("p1").await);

    let answer = cache.chat(ChatRequest::new("p1", "echo", "bye").finishing()).await.unwrap();
    assert_eq!(answer, "bye");
    assert!(!cache.contains("p1").await);

    let stats = cache.stats().await;
    assert_eq!(stats.total_misses, 1);
    assert_eq!(stats.total_hits, 1);
    assert_eq!(stats.total_terminations, 1);
}

#[tokio::test]
async fn test_concurrent_sessions_use_their_own_backends() {
    let dir = default_backends();
    let cache = Arc::new(cache_over(dir.path(), CacheConfig::default()));

    let first = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.chat(ChatRequest::new("p1", "alpha", "q1")).await })
    };
    let second = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.chat(ChatRequest::new("p2", "beta", "q2")).await })
    };

    assert_eq!(first.await.unwrap().unwrap(), "Mock response from alpha for: q1");
    assert_eq!(second.await.unwrap().unwrap(), "Mock response from beta for: q2");
    assert_eq!(cache.session_ids().await, vec!["p1", "p2"]);
}

#[tokio::test]
async fn test_unknown_backend_creates_no_session() {
    let dir = default_backends();
    let cache = cache_over(dir.path(), CacheConfig::default());

    let err = cache.chat(ChatRequest::new("p1", "ghost", "hi")).await.unwrap_err();
    assert_eq!(err, CacheError::BackendNotFound("ghost".to_string()));
    assert!(cache.is_empty().await);
    assert_eq!(cache.stats().await.failed_resolutions, 1);
}

#[tokio::test]
async fn test_unknown_kind_is_invalid_backend() {
    let dir = default_backends();
    let cache = cache_over(dir.path(), CacheConfig::default());

    let err = cache.get_or_create("p1", "broken").await.unwrap_err();
    assert!(matches!(err, CacheError::BackendInvalid { ref name, .. } if name == "broken"));
    assert!(!cache.contains("p1").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lookups_resolve_once() {
    let dir = default_backends();
    let loader = Arc::new(CountingLoader::new(registry(dir.path())));
    let cache = Arc::new(
        SessionCache::new(Arc::clone(&loader) as Arc<dyn BackendLoader>, CacheConfig::default()).unwrap(),
    );

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_or_create("shared", "echo").await })
        })
        .collect();

    let mut handle_ids = HashSet::new();
    for task in tasks {
        handle_ids.insert(task.await.unwrap().unwrap().handle_id());
    }

    assert_eq!(handle_ids.len(), 1);
    assert_eq!(loader.resolutions(), 1);
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn test_history_prompt_reaches_backend() {
    let dir = default_backends();
    let cache = cache_over(dir.path(), CacheConfig::default());

    let prompt = Prompt::History(vec![ChatTurn::answered("q0", "a0"), ChatTurn::prompt("q1")]);
    let answer = cache.chat(ChatRequest::new("p1", "alpha", prompt)).await.unwrap();
    assert_eq!(answer, "Mock response from alpha for: q1 (1 earlier turns)");
}

#[tokio::test]
async fn test_manifest_edits_apply_to_new_sessions_only() {
    let dir = backends_dir(&[("swap.toml", "kind = \"mock\"\nmodel = \"v1\"\n")]);
    let cache = cache_over(dir.path(), CacheConfig::default());

    let answer = cache.chat(ChatRequest::new("p1", "swap", "x")).await.unwrap();
    assert_eq!(answer, "Mock response from v1 for: x");

    std::fs::write(dir.path().join("swap.toml"), "kind = \"mock\"\nmodel = \"v2\"\n").unwrap();

    // The live session keeps its handle.
    let answer = cache.chat(ChatRequest::new("p1", "swap", "y")).await.unwrap();
    assert_eq!(answer, "Mock response from v1 for: y");

    // A fresh session sees the edit.
    let answer = cache.chat(ChatRequest::new("p2", "swap", "z")).await.unwrap();
    assert_eq!(answer, "Mock response from v2 for: z");
}

#[tokio::test]
async fn test_backend_failure_keeps_session_by_default() {
    let dir = default_backends();
    let cache = cache_over(dir.path(), CacheConfig::default());

    let err = cache.chat(ChatRequest::new("p1", FAILING_BACKEND, "hi")).await.unwrap_err();
    assert_eq!(err.client_message(), "Response Error: upstream exploded");
    assert!(cache.contains("p1").await);

    let stats = cache.stats().await;
    assert_eq!(stats.failed_invocations, 1);
    assert_eq!(stats.cache_size, 1);
}

#[tokio::test]
async fn test_backend_failure_evicts_when_configured() {
    let dir = default_backends();
    let config = CacheConfig { evict_on_error: true, ..CacheConfig::default() };
    let cache = cache_over(dir.path(), config);

    assert!(cache.chat(ChatRequest::new("p1", FAILING_BACKEND, "hi")).await.is_err());
    assert!(!cache.contains("p1").await);

    // The next call for the session is free to pick another backend.
    let answer = cache.chat(ChatRequest::new("p1", "echo", "again")).await.unwrap();
    assert_eq!(answer, "again");
}

#[tokio::test]
async fn test_finish_flag_terminates_failed_session() {
    let dir = default_backends();
    let cache = cache_over(dir.path(), CacheConfig::default());

    let request = ChatRequest::new("p1", FAILING_BACKEND, "hi").finishing();
    assert!(cache.chat(request).await.is_err());
    assert!(!cache.contains("p1").await);
}

#[tokio::test]
async fn test_idle_sessions_reclaimed_with_manual_clock() {
    let dir = default_backends();
    let clock = Arc::new(ManualClock::new());
    let cache = SessionCache::with_clock(Arc::new(registry(dir.path())), CacheConfig::default(), clock.clone())
        .unwrap();
    let timeout = cache.config().idle_timeout();

    cache.chat(ChatRequest::new("idle", "echo", "a")).await.unwrap();
    cache.chat(ChatRequest::new("busy", "echo", "b")).await.unwrap();

    clock.advance(Duration::from_secs(150));
    cache.chat(ChatRequest::new("busy", "echo", "c")).await.unwrap();
    clock.advance(Duration::from_secs(40));

    assert_eq!(cache.reclaim_idle(timeout).await, 1);
    assert_eq!(cache.session_ids().await, vec!["busy"]);

    // A reclaimed session is simply created again on its next call.
    cache.chat(ChatRequest::new("idle", "echo", "d")).await.unwrap();
    let stats = cache.stats().await;
    assert_eq!(stats.total_reclaimed, 1);
    assert_eq!(stats.total_misses, 3);
}

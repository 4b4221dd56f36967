//! Shared test utilities for Tether Core integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;
use tether_abstraction::{BackendError, ChatBackend, ChatTurn};
use tether_core::server::{self, AppState};
use tether_core::{CacheConfig, SessionCache};
use tether_models::{BackendLoader, BackendRegistry};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Name of the statically registered backend that always fails.
pub const FAILING_BACKEND: &str = "failing";

/// A backend whose every call fails.
#[derive(Debug)]
pub struct FailingBackend;

#[async_trait]
impl ChatBackend for FailingBackend {
    async fn chat(&self, _history: &[ChatTurn]) -> Result<String, BackendError> {
        Err(BackendError::Response("upstream exploded".to_string()))
    }

    fn backend_id(&self) -> &str {
        FAILING_BACKEND
    }
}

/// Wraps a loader and counts its resolutions.
pub struct CountingLoader<L> {
    inner: L,
    resolutions: AtomicUsize,
}

impl<L> CountingLoader<L> {
    pub fn new(inner: L) -> Self {
        Self { inner, resolutions: AtomicUsize::new(0) }
    }

    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }
}

impl<L: BackendLoader> BackendLoader for CountingLoader<L> {
    fn resolve(&self, name: &str) -> Result<Arc<dyn ChatBackend>, BackendError> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(name)
    }
}

/// Creates a backends directory holding the given `(file_name, content)` pairs.
pub fn backends_dir(manifests: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for (file_name, content) in manifests {
        std::fs::write(dir.path().join(file_name), content).expect("Failed to write manifest");
    }
    dir
}

/// The manifests most tests need.
pub fn default_backends() -> TempDir {
    backends_dir(&[
        ("echo.toml", "kind = \"echo\"\n"),
        ("alpha.toml", "kind = \"mock\"\nmodel = \"alpha\"\n"),
        ("beta.toml", "kind = \"mock\"\nmodel = \"beta\"\n"),
        ("broken.toml", "kind = \"nope\"\n"),
    ])
}

/// A registry over `dir` plus the always-failing static backend.
pub fn registry(dir: &Path) -> BackendRegistry {
    let mut registry = BackendRegistry::new(dir);
    registry.register_static(FAILING_BACKEND, || Ok(Arc::new(FailingBackend) as Arc<dyn ChatBackend>));
    registry
}

/// A running test server.
pub struct TestServer {
    pub addr: SocketAddr,
    pub cache: Arc<SessionCache>,
    pub shutdown: CancellationToken,
    pub handle: tokio::task::JoinHandle<tether_core::Result<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Starts a server on an ephemeral port serving backends from `dir`.
pub async fn start_test_server(dir: &Path, config: CacheConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind to port 0");
    let addr = listener.local_addr().unwrap();

    let loader: Arc<dyn BackendLoader> = Arc::new(registry(dir));
    let cache = Arc::new(SessionCache::new(Arc::clone(&loader), config).expect("Invalid cache config"));
    let state = Arc::new(AppState::new(Arc::clone(&cache), loader, dir));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server::serve(listener, state, shutdown.clone()));
    TestServer { addr, cache, shutdown, handle }
}

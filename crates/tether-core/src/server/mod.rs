//! Server module for Tether Core.
//!
//! This module contains the HTTP server and its route handlers.

pub mod logging;
mod routes;

pub use routes::MAX_BODY_BYTES;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tether_models::{BackendLoader, BackendRegistry};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::SessionCache;
use crate::config::Config;
use crate::error::Result;

/// State shared by every connection.
pub struct AppState {
    cache: Arc<SessionCache>,
    loader: Arc<dyn BackendLoader>,
    backends_dir: PathBuf,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("cache", &self.cache)
            .field("loader", &"<BackendLoader>")
            .field("backends_dir", &self.backends_dir)
            .finish()
    }
}

impl AppState {
    /// Creates the shared state.
    ///
    /// `loader` serves the uncached `/testlocalchat` route; `backends_dir` is
    /// what `/get_existing_models` lists.
    pub fn new(cache: Arc<SessionCache>, loader: Arc<dyn BackendLoader>, backends_dir: impl Into<PathBuf>) -> Self {
        Self { cache, loader, backends_dir: backends_dir.into() }
    }

    /// The session cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// The backend loader.
    #[must_use]
    pub fn loader(&self) -> &dyn BackendLoader {
        &*self.loader
    }

    /// The backends directory.
    #[must_use]
    pub fn backends_dir(&self) -> &Path {
        &self.backends_dir
    }
}

/// Accepts connections on `listener` until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn serve(listener: TcpListener, state: Arc<AppState>, shutdown: CancellationToken) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "HTTP server started");

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("Shutdown signal received, stopping accept loop");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!(%peer, "New connection");
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |request| {
                                logging::handle(request, Arc::clone(&state))
                            });
                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                debug!(%peer, error = %e, "Error serving connection");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }
        }
    }

    Ok(())
}

/// Start the Tether server and run it until `shutdown` is cancelled.
///
/// Builds the backend registry and session cache from `config`, starts the
/// reaper, and stops it again once the server has stopped.
///
/// # Errors
///
/// Returns an error if the cache configuration is invalid, the backends
/// directory cannot be read, or the server cannot bind its address.
pub async fn run(config: &Config, shutdown: CancellationToken) -> Result<()> {
    let registry = BackendRegistry::new(config.backends.dir.clone());
    registry.scan()?;
    let loader: Arc<dyn BackendLoader> = Arc::new(registry);

    let cache = Arc::new(SessionCache::new(Arc::clone(&loader), config.cache.clone())?);
    let reaper_cancel = shutdown.child_token();
    let reaper = Arc::clone(&cache).spawn_reaper(reaper_cancel.clone());

    let state = Arc::new(AppState::new(Arc::clone(&cache), loader, config.backends.dir.clone()));
    let result = match TcpListener::bind(config.server.address).await {
        Ok(listener) => serve(listener, state, shutdown).await,
        Err(e) => {
            error!(address = %config.server.address, error = %e, "Failed to bind");
            Err(e.into())
        }
    };

    reaper_cancel.cancel();
    if let Err(e) = reaper.await {
        warn!(error = %e, "Reaper task ended abnormally");
    }
    cache.clear().await;

    result
}

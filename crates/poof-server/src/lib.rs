//! Poof production server.
//!
//! Burn-after-reading secret service: clients store an opaque ciphertext and
//! receive a content-addressed key; the first correct receive destroys the
//! secret. The server never sees plaintext or passphrases.
//!
//! # Architecture
//!
//! The [`storage`] module holds the only logic with real invariants (release
//! at most once, expiry, capacity, durability). [`api`] is thin glue that
//! validates requests with [`poof_core::validate`] and maps them onto a
//! [`SecretStore`] chosen once at startup.
//!
//! # Components
//!
//! - [`MemoryStore`]: volatile backend with per-entry eviction timers
//! - [`RedbStore`]: durable backend with a periodic expiry sweep
//! - [`Server`]: axum HTTP runtime over the selected store
//! - [`SystemEnv`]: production environment (wall clock, Tokio timers, OS RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
mod error;
pub mod storage;
mod system_env;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use api::{AppState, build_router};
use axum::Router;
pub use error::ServerError;
pub use storage::{
    ChaoticStore, MemoryStore, RedbStore, SecretStore, StoreConfig, StoreError, StoreMetrics,
};
pub use system_env::SystemEnv;
use tokio::net::TcpListener;

/// Default maximum request body size (50 KiB); bounds the size of secrets.
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:5000")
    pub bind_address: String,
    /// Durable store file; `None` selects the volatile backend
    pub persist: Option<PathBuf>,
    /// Maximum accepted request body in bytes
    pub max_body_bytes: usize,
    /// Store limits and sweep cadence
    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            persist: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            store: StoreConfig::default(),
        }
    }
}

/// Open the backend selected by the configuration.
///
/// # Errors
///
/// Fails if the durable store cannot be opened, or if called outside a Tokio
/// runtime. Either is fatal at startup.
pub fn open_store(config: &ServerConfig) -> Result<Arc<dyn SecretStore>, ServerError> {
    match &config.persist {
        Some(path) => {
            tracing::info!(path = %path.display(), "Using durable store");
            Ok(Arc::new(RedbStore::open(path, config.store.clone())?))
        },
        None => {
            tracing::info!("Using volatile store; secrets are lost on restart");
            Ok(Arc::new(MemoryStore::new(config.store.clone())?))
        },
    }
}

/// Production poof server.
///
/// Serves the HTTP API over one store and closes the store on shutdown.
pub struct Server {
    listener: TcpListener,
    router: Router,
    store: Arc<dyn SecretStore>,
}

impl Server {
    /// Open the configured store and bind the listener.
    ///
    /// If binding fails the freshly opened store is closed again, so its file
    /// is free for a retry.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let store = open_store(&config)?;

        match Self::with_store(&config, Arc::clone(&store)).await {
            Ok(server) => Ok(server),
            Err(e) => {
                if let Err(close_err) = store.close() {
                    tracing::warn!("Failed to close store after bind error: {}", close_err);
                }
                Err(e)
            },
        }
    }

    /// Bind the listener over an already opened store.
    pub async fn with_store(
        config: &ServerConfig,
        store: Arc<dyn SecretStore>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address).await.map_err(|e| {
            ServerError::Config(format!("cannot bind {}: {e}", config.bind_address))
        })?;

        let router = build_router(AppState { store: Arc::clone(&store) }, config.max_body_bytes);

        Ok(Self { listener, router, store })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until Ctrl-C, then close the store.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` completes, then close the store.
    ///
    /// The store is closed even if serving failed, so the durable backend
    /// always gets its final sweep.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.listener.local_addr()?);

        let served =
            axum::serve(self.listener, self.router).with_graceful_shutdown(shutdown).await;
        let closed = self.store.close();

        if let Err(e) = &served {
            tracing::error!("Server error: {}", e);
        }
        served?;
        closed?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl-C, serving until killed: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

//! Graceful shutdown coordination
//!
//! On SIGINT or SIGTERM the HTTP server stops accepting connections and
//! drains in-flight requests for at most the configured timeout. Registered
//! [`ShutdownHandler`]s then run under the same timeout; the store handler folds the SQLite WAL back into the
//! database file so a clean exit leaves a single file behind.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::store::Store;

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Upper bound for the connection drain, and again for the handlers
    pub total_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            total_timeout: Duration::from_secs(30),
        }
    }
}

impl ShutdownConfig {
    pub fn with_total_timeout(mut self, timeout_secs: u64) -> Self {
        self.total_timeout = Duration::from_secs(timeout_secs);
        self
    }
}

pub struct ShutdownCoordinator {
    config: ShutdownConfig,
    shutdown_token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Token cancelled once shutdown begins
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Starts shutdown without waiting for a signal.
    pub fn trigger(&self) {
        self.shutdown_token.cancel();
    }

    /// Resolves on SIGINT, SIGTERM or [`trigger`](Self::trigger).
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("received SIGINT (Ctrl+C), initiating graceful shutdown");
            },
            _ = terminate => {
                info!("received SIGTERM, initiating graceful shutdown");
            },
            _ = self.shutdown_token.cancelled() => {
                info!("shutdown requested");
            },
        }
        self.shutdown_token.cancel();
    }

    /// Drives `server` to completion. Once shutdown has begun it gets
    /// `total_timeout` to finish, after which it is dropped and `None` is
    /// returned.
    pub async fn drain<F: Future>(&self, server: F) -> Option<F::Output> {
        let deadline = async {
            self.shutdown_token.cancelled().await;
            tokio::time::sleep(self.config.total_timeout).await;
        };
        tokio::select! {
            output = server => Some(output),
            _ = deadline => {
                warn!(
                    timeout_secs = self.config.total_timeout.as_secs(),
                    "connection drain exceeded timeout, closing remaining connections"
                );
                None
            }
        }
    }

    /// Runs `handler` bounded by the configured total timeout.
    pub async fn shutdown(&self, handler: &dyn ShutdownHandler) -> Result<()> {
        self.shutdown_token.cancel();
        info!("running shutdown handlers");

        match timeout(self.config.total_timeout, handler.shutdown()).await {
            Ok(result) => {
                if result.is_ok() {
                    info!("graceful shutdown completed");
                }
                result
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.total_timeout.as_secs(),
                    "shutdown handlers exceeded total timeout"
                );
                Err(anyhow::anyhow!("shutdown timeout exceeded"))
            }
        }
    }
}

/// Components that release resources on exit
#[async_trait::async_trait]
pub trait ShutdownHandler: Send + Sync {
    async fn shutdown(&self) -> Result<()>;
}

/// Checkpoints the WAL so the database file is self-contained.
pub struct StoreShutdownHandler {
    store: Store,
}

impl StoreShutdownHandler {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ShutdownHandler for StoreShutdownHandler {
    async fn shutdown(&self) -> Result<()> {
        self.store.checkpoint().await?;
        info!(path = %self.store.path().display(), "store checkpointed");
        Ok(())
    }
}

#[derive(Default)]
pub struct CompositeShutdownHandler {
    handlers: Vec<Box<dyn ShutdownHandler>>,
}

impl CompositeShutdownHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, handler: Box<dyn ShutdownHandler>) {
        self.handlers.push(handler);
    }
}

#[async_trait::async_trait]
impl ShutdownHandler for CompositeShutdownHandler {
    /// Runs every handler; one failing does not stop the rest.
    async fn shutdown(&self) -> Result<()> {
        for (idx, handler) in self.handlers.iter().enumerate() {
            if let Err(e) = handler.shutdown().await {
                error!(handler_index = idx, "shutdown handler error: {}", e);
            }
        }
        Ok(())
    }
}

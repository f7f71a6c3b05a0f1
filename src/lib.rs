pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod orders;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod store;
pub mod utils;

pub use config::{CliArgs, ServerConfig};
pub use error::{AppError, AppResult};
pub use logging::{LoggingConfig, init_logging, shutdown_telemetry};
pub use server::router;
pub use shutdown::{ShutdownConfig, ShutdownCoordinator};
pub use state::AppState;

use anyhow::{Context, Result};
use shutdown::{CompositeShutdownHandler, StoreShutdownHandler};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let config = Arc::new(config);
    let state = Arc::new(AppState::new(config.clone())?);

    tracing::info!(
        database = %config.database_path.display(),
        bind = %config.http_bind_address,
        "starting forgeworks storefront",
    );

    match startup_summary(&state).await {
        Ok((products, orders)) => {
            tracing::info!(products, orders, "store contents at startup");
        }
        Err(error) => {
            tracing::warn!(?error, "startup summary failed");
        }
    }

    let coordinator = Arc::new(ShutdownCoordinator::new(
        ShutdownConfig::default().with_total_timeout(config.graceful_shutdown_timeout_secs),
    ));
    let mut composite_handler = CompositeShutdownHandler::new();
    composite_handler.add_handler(Box::new(StoreShutdownHandler::new(state.store.clone())));

    let listener = TcpListener::bind(config.http_bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.http_bind_address))?;
    let actual_addr = listener.local_addr()?;
    tracing::info!(bind = %actual_addr, "listening");

    let shutdown_coordinator = coordinator.clone();
    let serve = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown_coordinator.wait_for_signal().await;
        })
        .into_future();
    let server_result = coordinator.drain(serve).await.unwrap_or(Ok(()));

    tracing::info!("server stopped, running shutdown handlers");
    if let Err(e) = coordinator.shutdown(&composite_handler).await {
        tracing::error!("error during shutdown: {}", e);
    }

    server_result.map_err(anyhow::Error::from)
}

/// Product and order counts, logged once the store is open.
pub async fn startup_summary(state: &AppState) -> AppResult<(usize, i64)> {
    let products = state.catalog.list_products().await?.len();
    let orders = state
        .store
        .call("count_orders", |conn| store::orders::count_orders(conn))
        .await?;
    Ok((products, orders))
}

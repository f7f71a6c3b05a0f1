use anyhow::{Context, Result};
use std::sync::Arc;

use crate::auth::AuthService;
use crate::catalog::CatalogService;
use crate::config::ServerConfig;
use crate::orders::OrderService;
use crate::store::Store;

/// Everything a request handler needs; shared behind an `Arc`.
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Store,
    pub catalog: CatalogService,
    pub orders: OrderService,
    pub auth: AuthService,
}

impl AppState {
    /// Opens the configured store and builds the services over it.
    pub fn new(config: Arc<ServerConfig>) -> Result<Self> {
        let store = Store::open(&config.store_config()).with_context(|| {
            format!(
                "failed to open database {}",
                config.database_path.display()
            )
        })?;
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Arc<ServerConfig>, store: Store) -> Self {
        let catalog = CatalogService::new(store.clone());
        let orders = OrderService::new(store.clone(), catalog.clone());
        let auth = AuthService::new(store.clone(), config.password_hash_cost);
        Self {
            config,
            store,
            catalog,
            orders,
            auth,
        }
    }

    /// Fresh in-memory state, mostly for tests.
    pub fn in_memory() -> Result<Self> {
        Self::new(Arc::new(ServerConfig::in_memory()))
    }
}

//! Shared application state for all routes.

use crate::config::RouterConfig;
use crate::error::ConfigError;
use crate::pool::PoolManager;
use crate::resolver::TenantResolver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<TenantResolver>,
    /// Pool registry; also tracks whether shutdown has begun.
    pub pools: Arc<PoolManager>,
    /// Set when a shutdown signal arrives, before in-flight requests finish.
    draining: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(resolver: TenantResolver, pools: PoolManager) -> Self {
        AppState {
            resolver: Arc::new(resolver),
            pools: Arc::new(pools),
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn begin_drain(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    /// True once shutdown has been signalled or the pools are closing.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst) || self.pools.is_closing()
    }

    pub fn from_config(config: &RouterConfig) -> Result<Self, ConfigError> {
        let resolver = TenantResolver::from_config(config)?;
        tracing::info!(
            static_brands = config.tenants.len(),
            remote = config.remote.is_some(),
            "tenant resolver ready"
        );
        Ok(AppState::new(resolver, PoolManager::new(config.pool.clone())))
    }
}

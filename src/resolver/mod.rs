//! Tenant route resolution: cache, then static config, then the routing authority.
//!
//! Concurrent misses for the same tenant share one in-flight resolution. Failures are
//! never cached; the next call after a failure tries again.

mod remote;

pub use remote::{HttpRoutingAuthority, RemoteError, RemoteRoute, RoutingAuthority};

use crate::cache::RouteCache;
use crate::codec;
use crate::config::{CacheConfig, RouterConfig};
use crate::error::{ConfigError, ResolutionError};
use crate::tenant::{Route, StaticTenantTable, TenantKey, DEFAULT_DB_PORT};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

type Flight = Arc<OnceCell<Result<Arc<Route>, ResolutionError>>>;

pub struct TenantResolver {
    cache: RouteCache,
    tenants: StaticTenantTable,
    authority: Option<Arc<dyn RoutingAuthority>>,
    credential_key: Option<SecretString>,
    inflight: Mutex<HashMap<TenantKey, Flight>>,
}

impl TenantResolver {
    pub fn new(cache: &CacheConfig, tenants: StaticTenantTable) -> Self {
        TenantResolver {
            cache: RouteCache::new(cache.capacity, cache.ttl),
            tenants,
            authority: None,
            credential_key: None,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_authority(mut self, authority: Arc<dyn RoutingAuthority>, credential_key: Option<SecretString>) -> Self {
        self.authority = Some(authority);
        self.credential_key = credential_key;
        self
    }

    /// Resolver wired to the HTTP routing authority when one is configured.
    pub fn from_config(config: &RouterConfig) -> Result<Self, ConfigError> {
        let resolver = TenantResolver::new(&config.cache, config.tenants.clone());
        Ok(match &config.remote {
            Some(remote) => resolver.with_authority(
                Arc::new(HttpRoutingAuthority::new(remote)?),
                config.credential_key.clone(),
            ),
            None => resolver,
        })
    }

    pub fn cache(&self) -> &RouteCache {
        &self.cache
    }

    /// Drop a cached route so the next request re-resolves it.
    pub fn invalidate(&self, raw_key: &str) -> bool {
        match TenantKey::parse(raw_key) {
            Ok(key) => self.cache.remove(&key),
            Err(_) => false,
        }
    }

    pub async fn resolve(&self, raw_key: &str) -> Result<Arc<Route>, ResolutionError> {
        let key = TenantKey::parse(raw_key)?;
        if let Some(route) = self.cache.get(&key) {
            tracing::debug!(tenant = %key, "route cache hit");
            return Ok(route);
        }

        let flight = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            inflight.entry(key.clone()).or_default().clone()
        };
        let result = flight.get_or_init(|| self.resolve_uncached(&key)).await.clone();

        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if inflight.get(&key).is_some_and(|current| Arc::ptr_eq(current, &flight)) {
            inflight.remove(&key);
        }
        result
    }

    async fn resolve_uncached(&self, key: &TenantKey) -> Result<Arc<Route>, ResolutionError> {
        // A caller that lost the race to the slot may find the winner already cached it.
        if let Some(route) = self.cache.get(key) {
            return Ok(route);
        }

        if let Some(route) = self.tenants.get(key).and_then(|entry| entry.to_route(key)) {
            tracing::debug!(tenant = %key, "route from static config");
            return Ok(self.remember(key, route));
        }

        let Some(authority) = &self.authority else {
            tracing::debug!(tenant = %key, "no static route and no routing authority configured");
            return Err(ResolutionError::NotFound(key.to_string()));
        };

        let remote = authority.lookup(key).await.map_err(|e| {
            tracing::warn!(tenant = %key, error = %e, "remote route lookup failed");
            match e {
                RemoteError::NotFound => ResolutionError::NotFound(key.to_string()),
                RemoteError::Suspended => ResolutionError::Suspended(key.to_string()),
                RemoteError::Unavailable(reason) => ResolutionError::unavailable(key.as_str(), reason),
            }
        })?;
        let route = self.route_from_remote(key, remote)?;
        tracing::info!(tenant = %key, host = %route.host, database = %route.database_name, "route resolved remotely");
        Ok(self.remember(key, route))
    }

    fn remember(&self, key: &TenantKey, route: Route) -> Arc<Route> {
        let route = Arc::new(route);
        self.cache.insert(key.clone(), route.clone());
        route
    }

    fn route_from_remote(&self, key: &TenantKey, remote: RemoteRoute) -> Result<Route, ResolutionError> {
        fn required(value: Option<String>) -> Option<String> {
            value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        }
        let missing = |field: &str| {
            tracing::warn!(tenant = %key, field, "routing authority response incomplete");
            ResolutionError::unavailable(key.as_str(), format!("missing {}", field))
        };

        let host = required(remote.host).ok_or_else(|| missing("host"))?;
        let user = required(remote.user).ok_or_else(|| missing("user"))?;
        let database = required(remote.database).ok_or_else(|| missing("database"))?;
        let blob = required(remote.password).ok_or_else(|| missing("secret"))?;

        let key_bytes = self
            .credential_key
            .as_ref()
            .map(|k| k.expose_secret().as_bytes())
            .unwrap_or_default();
        let secret = codec::decrypt(&blob, key_bytes).ok_or_else(|| missing("secret"))?;

        Ok(Route {
            tenant_key: key.clone(),
            host,
            port: remote.port.unwrap_or(DEFAULT_DB_PORT),
            database_user: user,
            database_secret: secret,
            database_name: database,
        })
    }
}

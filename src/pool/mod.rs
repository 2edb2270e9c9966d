//! One bounded MySQL pool per physical target and database user. Brands that share a
//! server, database and login share the pool; a different login gets its own.

mod facade;

pub use facade::{ExecutionFacade, QueryOptions, QueryOutcome};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::tenant::{PhysicalKey, Route};
use futures_util::future::join_all;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Registry key: where the pool connects and who it connects as.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub target: PhysicalKey,
    pub user: String,
}

impl PoolKey {
    pub fn for_route(route: &Route) -> Self {
        PoolKey {
            target: route.physical_key(),
            user: route.database_user.clone(),
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.target)
    }
}

/// A live pool plus its admission gate and the secret it was opened with.
pub(crate) struct TenantPool {
    pub(crate) key: PoolKey,
    pub(crate) pool: MySqlPool,
    pub(crate) admission: Arc<Semaphore>,
    secret: SecretString,
    max_connections: u32,
}

impl TenantPool {
    fn opened_with(&self, route: &Route) -> bool {
        self.secret.expose_secret() == route.database_secret.expose_secret()
    }
}

/// Admission permits for one pool: active connections plus queued callers.
pub(crate) fn admission_permits(config: &PoolConfig) -> usize {
    (config.max_connections as usize)
        .saturating_add(config.max_waiting as usize)
        .min(Semaphore::MAX_PERMITS)
}

#[derive(Clone, Debug, Serialize)]
pub struct PoolStats {
    pub target: String,
    pub user: String,
    pub size: u32,
    pub idle: usize,
    pub max_connections: u32,
    /// Admission permits not currently held by a caller.
    pub available_permits: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseOutcome {
    Closed,
    TimedOut,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ShutdownReport {
    pub pools: Vec<(String, CloseOutcome)>,
    pub closed: usize,
    pub timed_out: usize,
}

pub struct PoolManager {
    config: PoolConfig,
    pools: Mutex<HashMap<PoolKey, Arc<TenantPool>>>,
    closing: AtomicBool,
}

impl PoolManager {
    pub fn new(config: PoolConfig) -> Self {
        PoolManager {
            config,
            pools: Mutex::new(HashMap::new()),
            closing: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Facade over the pool for `route`'s target and login, creating the pool on first
    /// use. A route carrying a different secret for the same login (a rotated
    /// credential) replaces the pool; the old one closes once its connections return.
    pub fn get_connection(&self, route: &Arc<Route>) -> Result<ExecutionFacade, PoolError> {
        let key = PoolKey::for_route(route);
        let (pool, retired) = {
            let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
            // Checked under the registry lock so no pool is registered after shutdown drains it.
            if self.closing.load(Ordering::SeqCst) {
                return Err(PoolError::ShuttingDown);
            }
            match pools.get(&key) {
                Some(existing) if existing.opened_with(route) => (existing.clone(), None),
                _ => {
                    let created = Arc::new(self.create_pool(route, key.clone())?);
                    let retired = pools.insert(key, created.clone());
                    (created, retired)
                }
            }
        };
        if let Some(old) = retired {
            tracing::info!(pool = %old.key, tenant = %route.tenant_key, "credential changed, retiring pool");
            old.admission.close();
            tokio::spawn(async move { old.pool.close().await });
        }
        Ok(ExecutionFacade::new(pool, route.clone(), self.config.query_timeout))
    }

    fn create_pool(&self, route: &Route, key: PoolKey) -> Result<TenantPool, PoolError> {
        if route.host.trim().is_empty() || route.database_name.trim().is_empty() {
            return Err(PoolError::InvalidTarget(key.to_string()));
        }
        let options = MySqlConnectOptions::new()
            .host(&route.host)
            .port(route.port)
            .username(&route.database_user)
            .password(route.database_secret.expose_secret())
            .database(&route.database_name);

        let timezone = self.config.session_timezone.clone();
        let pool = MySqlPoolOptions::new()
            .max_connections(self.config.max_connections)
            .min_connections(self.config.min_connections)
            .acquire_timeout(self.config.acquire_timeout)
            .idle_timeout(Some(self.config.idle_timeout))
            .max_lifetime(Some(self.config.max_lifetime))
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                let timezone = timezone.clone();
                Box::pin(async move {
                    sqlx::query("SET time_zone = ?").bind(timezone).execute(conn).await?;
                    Ok(())
                })
            })
            .connect_lazy_with(options);

        tracing::info!(
            pool = %key,
            tenant = %route.tenant_key,
            max_connections = self.config.max_connections,
            "created connection pool"
        );
        Ok(TenantPool {
            key,
            pool,
            admission: Arc::new(Semaphore::new(admission_permits(&self.config))),
            secret: route.database_secret.clone(),
            max_connections: self.config.max_connections,
        })
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub fn pool_count(&self) -> usize {
        self.pools.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        let pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
        let mut stats: Vec<PoolStats> = pools
            .values()
            .map(|p| PoolStats {
                target: p.key.target.to_string(),
                user: p.key.user.clone(),
                size: p.pool.size(),
                idle: p.pool.num_idle(),
                max_connections: p.max_connections,
                available_permits: p.admission.available_permits(),
            })
            .collect();
        stats.sort_by(|a, b| (&a.target, &a.user).cmp(&(&b.target, &b.user)));
        stats
    }

    /// Connections currently open across every registered pool.
    pub fn open_connections(&self) -> u32 {
        let pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
        pools.values().map(|p| p.pool.size()).sum()
    }

    /// Refuse new work, then close every pool concurrently. Each close waits for
    /// checked-out connections to come back, bounded by `grace`.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let drained: Vec<Arc<TenantPool>> = {
            let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
            self.closing.store(true, Ordering::SeqCst);
            pools.drain().map(|(_, p)| p).collect()
        };
        tracing::info!(pools = drained.len(), grace_secs = grace.as_secs(), "closing connection pools");

        let closes = drained.iter().map(|p| async move {
            p.admission.close();
            let outcome = match tokio::time::timeout(grace, p.pool.close()).await {
                Ok(()) => CloseOutcome::Closed,
                Err(_) => {
                    tracing::warn!(pool = %p.key, "pool did not close within grace period");
                    CloseOutcome::TimedOut
                }
            };
            (p.key.to_string(), outcome)
        });
        let pools = join_all(closes).await;

        let closed = pools.iter().filter(|(_, o)| *o == CloseOutcome::Closed).count();
        let report = ShutdownReport {
            timed_out: pools.len() - closed,
            closed,
            pools,
        };
        tracing::info!(closed = report.closed, timed_out = report.timed_out, "connection pools closed");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::{StaticTenantEntry, TenantKey};

    fn login_route(tenant: &str, host: &str, database: &str, user: &str, password: &str) -> Arc<Route> {
        let entry = StaticTenantEntry {
            host: Some(host.into()),
            port: None,
            user: Some(user.into()),
            password: Some(password.into()),
            database: Some(database.into()),
        };
        Arc::new(entry.to_route(&TenantKey::parse(tenant).unwrap()).unwrap())
    }

    fn route(tenant: &str, host: &str, database: &str) -> Arc<Route> {
        login_route(tenant, host, database, "reporter", "pw")
    }

    #[tokio::test]
    async fn tenants_on_same_target_share_a_pool() {
        let manager = PoolManager::new(PoolConfig::default());
        manager.get_connection(&route("pts", "db-1.internal", "shared")).unwrap();
        manager.get_connection(&route("acme", "db-1.internal", "shared")).unwrap();
        assert_eq!(manager.pool_count(), 1);

        manager.get_connection(&route("zeta", "db-2.internal", "shared")).unwrap();
        assert_eq!(manager.pool_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_first_use_creates_one_pool() {
        let manager = Arc::new(PoolManager::new(PoolConfig::default()));
        let target = route("pts", "db-1.internal", "pts");
        let mut handles = Vec::new();
        for _ in 0..32 {
            let manager = manager.clone();
            let target = target.clone();
            handles.push(tokio::spawn(async move { manager.get_connection(&target).is_ok() }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }
        assert_eq!(manager.pool_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_everything_and_refuses_new_work() {
        let manager = PoolManager::new(PoolConfig::default());
        manager.get_connection(&route("pts", "db-1.internal", "pts")).unwrap();
        manager.get_connection(&route("acme", "db-2.internal", "acme")).unwrap();

        let report = manager.shutdown(Duration::from_secs(1)).await;
        assert_eq!(report.closed, 2);
        assert_eq!(report.timed_out, 0);
        assert!(manager.is_closing());
        assert_eq!(manager.open_connections(), 0);
        assert!(matches!(
            manager.get_connection(&route("pts", "db-1.internal", "pts")),
            Err(PoolError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn stats_report_configured_bounds() {
        let manager = PoolManager::new(PoolConfig::default());
        manager.get_connection(&route("pts", "db-1.internal", "pts")).unwrap();
        let stats = manager.stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].target, "db-1.internal:3306/pts");
        assert_eq!(stats[0].max_connections, 5);
        assert_eq!(stats[0].available_permits, 37);
        assert_eq!(stats[0].size, 0);
    }

    #[tokio::test]
    async fn different_logins_on_one_target_get_their_own_pool() {
        let manager = PoolManager::new(PoolConfig::default());
        let pts = manager
            .get_connection(&login_route("pts", "db-1.internal", "reports", "pts_ro", "a"))
            .unwrap();
        let acme = manager
            .get_connection(&login_route("acme", "db-1.internal", "reports", "acme_ro", "b"))
            .unwrap();

        assert_eq!(manager.pool_count(), 2);
        assert_eq!(pts.pool_key().user, "pts_ro");
        assert_eq!(acme.pool_key().user, "acme_ro");
        assert_eq!(pts.target(), acme.target());
    }

    #[tokio::test]
    async fn rotated_secret_replaces_the_pool() {
        let manager = PoolManager::new(PoolConfig::default());
        let before = manager
            .get_connection(&login_route("pts", "db-1.internal", "pts", "pts_ro", "old"))
            .unwrap();
        let after = manager
            .get_connection(&login_route("pts", "db-1.internal", "pts", "pts_ro", "new"))
            .unwrap();

        assert_eq!(manager.pool_count(), 1);
        assert!(!before.shares_pool_with(&after));
        assert!(before.pool_is_retired());
        assert!(!after.pool_is_retired());

        // Same secret again reuses the replacement.
        let again = manager
            .get_connection(&login_route("pts", "db-1.internal", "pts", "pts_ro", "new"))
            .unwrap();
        assert!(again.shares_pool_with(&after));

        let err = before.fetch_all("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, PoolError::ShuttingDown));
    }

    #[tokio::test]
    async fn huge_wait_queue_is_clamped_not_overflowed() {
        let config = PoolConfig {
            max_waiting: u32::MAX,
            ..PoolConfig::default()
        };
        assert_eq!(admission_permits(&config), (u32::MAX as usize).saturating_add(5).min(Semaphore::MAX_PERMITS));
        let manager = PoolManager::new(config);
        assert!(manager.get_connection(&route("pts", "db-1.internal", "pts")).is_ok());
    }
}

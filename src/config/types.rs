//! Process configuration for routing, caching, and pooling.

use crate::tenant::StaticTenantTable;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::time::Duration;

/// Route cache bounds.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl: crate::cache::DEFAULT_TTL,
            capacity: crate::cache::DEFAULT_CAPACITY,
        }
    }
}

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// External routing authority. Absent when `ROUTING_AUTHORITY_URL` is unset.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub base_url: String,
    pub token: Option<SecretString>,
    pub timeout: Duration,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        RemoteConfig {
            base_url: base_url.into(),
            token: None,
            timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }
}

/// Per-target pool sizing. Tenants are many small databases, so defaults stay small.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    /// Callers allowed to queue for a connection beyond `max_connections`.
    pub max_waiting: u32,
    pub query_timeout: Duration,
    /// Applied once per new connection with `SET time_zone`.
    pub session_timezone: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_connections: 5,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(1800),
            max_waiting: 32,
            query_timeout: Duration::from_secs(30),
            session_timezone: "+05:30".into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub bind_addr: SocketAddr,
    pub cache: CacheConfig,
    pub remote: Option<RemoteConfig>,
    /// Shared key for routing-authority credential blobs.
    pub credential_key: Option<SecretString>,
    pub pool: PoolConfig,
    pub shutdown_grace: Duration,
    pub tenants: StaticTenantTable,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            cache: CacheConfig::default(),
            remote: None,
            credential_key: None,
            pool: PoolConfig::default(),
            shutdown_grace: Duration::from_secs(10),
            tenants: StaticTenantTable::new(),
        }
    }
}

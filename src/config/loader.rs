//! Load router config and the static brand table from environment variables.
//!
//! Brands can be declared two ways, merged into one table:
//! - by prefix: `BRAND_KEYS=PTS,ACME` with `PTS_DB_HOST`, `PTS_DB_USER`, `PTS_DB_PASSWORD`,
//!   `PTS_DB_NAME` and optional `PTS_DB_PORT`;
//! - by index: `TOTAL_CONFIG_COUNT=N` with `BRAND_TAG_i`, `DB_HOST_i`, `DB_USER_i`,
//!   `DB_PASSWORD_i`, `DB_DATABASE_i` and optional `DB_PORT_i` for `i < N`.

use crate::config::types::{CacheConfig, PoolConfig, RemoteConfig, RouterConfig, DEFAULT_REMOTE_TIMEOUT};
use crate::config::validate;
use crate::error::ConfigError;
use crate::tenant::{StaticTenantEntry, StaticTenantTable, TenantKey};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl RouterConfig {
    /// Read `.env` (if present) and the process environment, then validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (the environment, or a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RouterConfig::default();
        let pool_defaults = PoolConfig::default();

        let bind_addr: SocketAddr = parse_or(&lookup, "BIND_ADDR", defaults.bind_addr)?;
        let cache = CacheConfig {
            ttl: secs_or(&lookup, "ROUTE_CACHE_TTL_SECS", defaults.cache.ttl)?,
            capacity: parse_or(&lookup, "ROUTE_CACHE_CAPACITY", defaults.cache.capacity)?,
        };

        let remote = match non_empty(&lookup, "ROUTING_AUTHORITY_URL") {
            Some(base_url) => Some(RemoteConfig {
                timeout: secs_or(&lookup, "ROUTING_AUTHORITY_TIMEOUT_SECS", DEFAULT_REMOTE_TIMEOUT)?,
                token: non_empty(&lookup, "ROUTING_AUTHORITY_TOKEN").map(SecretString::from),
                base_url,
            }),
            None => None,
        };

        let pool = PoolConfig {
            max_connections: parse_or(&lookup, "POOL_MAX_CONNECTIONS", pool_defaults.max_connections)?,
            min_connections: parse_or(&lookup, "POOL_MIN_CONNECTIONS", pool_defaults.min_connections)?,
            acquire_timeout: secs_or(&lookup, "POOL_ACQUIRE_TIMEOUT_SECS", pool_defaults.acquire_timeout)?,
            idle_timeout: secs_or(&lookup, "POOL_IDLE_TIMEOUT_SECS", pool_defaults.idle_timeout)?,
            max_lifetime: secs_or(&lookup, "POOL_MAX_LIFETIME_SECS", pool_defaults.max_lifetime)?,
            max_waiting: parse_or(&lookup, "POOL_MAX_WAITING", pool_defaults.max_waiting)?,
            query_timeout: secs_or(&lookup, "QUERY_TIMEOUT_SECS", pool_defaults.query_timeout)?,
            session_timezone: non_empty(&lookup, "DB_SESSION_TIMEZONE")
                .unwrap_or(pool_defaults.session_timezone),
        };

        let config = RouterConfig {
            bind_addr,
            cache,
            remote,
            credential_key: non_empty(&lookup, "CREDENTIAL_KEY").map(SecretString::from),
            pool,
            shutdown_grace: secs_or(&lookup, "SHUTDOWN_GRACE_SECS", defaults.shutdown_grace)?,
            tenants: load_tenant_table(&lookup)?,
        };
        validate(&config)?;
        Ok(config)
    }
}

fn entry_from<F>(lookup: &F, host: &str, port: &str, user: &str, password: &str, database: &str) -> Result<StaticTenantEntry, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let port = match non_empty(lookup, port) {
        Some(raw) => Some(raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
            key: port.to_string(),
            value: raw,
        })?),
        None => None,
    };
    Ok(StaticTenantEntry {
        host: non_empty(lookup, host),
        port,
        user: non_empty(lookup, user),
        password: non_empty(lookup, password),
        database: non_empty(lookup, database),
    })
}

/// Build the static brand table. Incomplete entries are skipped with a warning so a
/// partially configured brand falls through to the routing authority.
pub fn load_tenant_table<F>(lookup: &F) -> Result<StaticTenantTable, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut table = StaticTenantTable::new();

    let total: usize = parse_or(lookup, "TOTAL_CONFIG_COUNT", 0)?;
    for i in 0..total {
        let Some(tag) = non_empty(lookup, &format!("BRAND_TAG_{}", i)) else {
            tracing::warn!(index = i, "BRAND_TAG_{} missing, skipping", i);
            continue;
        };
        let key = match TenantKey::parse(&tag) {
            Ok(k) => k,
            Err(_) => {
                tracing::warn!(index = i, tag = %tag, "invalid brand tag, skipping");
                continue;
            }
        };
        let entry = entry_from(
            lookup,
            &format!("DB_HOST_{}", i),
            &format!("DB_PORT_{}", i),
            &format!("DB_USER_{}", i),
            &format!("DB_PASSWORD_{}", i),
            &format!("DB_DATABASE_{}", i),
        )?;
        if !entry.is_complete() {
            tracing::warn!(tenant = %key, index = i, "incomplete database config, skipping");
            continue;
        }
        table.insert(key, entry);
    }

    if let Some(keys) = non_empty(lookup, "BRAND_KEYS") {
        for raw in keys.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let key = match TenantKey::parse(raw) {
                Ok(k) => k,
                Err(_) => {
                    tracing::warn!(tag = %raw, "invalid brand key in BRAND_KEYS, skipping");
                    continue;
                }
            };
            let p = key.as_str();
            let entry = entry_from(
                lookup,
                &format!("{}_DB_HOST", p),
                &format!("{}_DB_PORT", p),
                &format!("{}_DB_USER", p),
                &format!("{}_DB_PASSWORD", p),
                &format!("{}_DB_NAME", p),
            )?;
            if !entry.is_complete() {
                tracing::warn!(tenant = %key, "incomplete database config, skipping");
                continue;
            }
            table.insert(key, entry);
        }
    }

    tracing::debug!(brands = table.len(), "static brand table loaded");
    Ok(table)
}

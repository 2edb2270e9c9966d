//! Config validation: bounds and formats that would otherwise fail at first use.

use crate::config::RouterConfig;
use crate::error::ConfigError;
use regex::Regex;
use std::sync::OnceLock;
use tokio::sync::Semaphore;

/// Upper bound on queued callers per pool.
pub const MAX_WAIT_QUEUE: u32 = 1_000_000;

fn timezone_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Numeric offsets (+05:30) or named zones (Asia/Kolkata, UTC, SYSTEM).
    RE.get_or_init(|| {
        Regex::new(r"^([+-](0\d|1[0-4]):[0-5]\d|[A-Za-z][A-Za-z0-9_+\-]*(/[A-Za-z0-9_+\-]+)*)$")
            .expect("static timezone pattern")
    })
}

pub fn validate(config: &RouterConfig) -> Result<(), ConfigError> {
    if config.cache.capacity == 0 {
        return Err(ConfigError::Validation("ROUTE_CACHE_CAPACITY must be at least 1".into()));
    }
    if config.cache.ttl.is_zero() {
        return Err(ConfigError::Validation("ROUTE_CACHE_TTL_SECS must be at least 1".into()));
    }

    if let Some(remote) = &config.remote {
        if !(remote.base_url.starts_with("http://") || remote.base_url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "ROUTING_AUTHORITY_URL must be an http(s) URL: {}",
                remote.base_url
            )));
        }
        if remote.timeout.is_zero() {
            return Err(ConfigError::Validation("ROUTING_AUTHORITY_TIMEOUT_SECS must be at least 1".into()));
        }
    }

    let pool = &config.pool;
    if pool.max_connections == 0 {
        return Err(ConfigError::Validation("POOL_MAX_CONNECTIONS must be at least 1".into()));
    }
    if pool.min_connections > pool.max_connections {
        return Err(ConfigError::Validation(format!(
            "POOL_MIN_CONNECTIONS ({}) exceeds POOL_MAX_CONNECTIONS ({})",
            pool.min_connections, pool.max_connections
        )));
    }
    if pool.max_waiting > MAX_WAIT_QUEUE {
        return Err(ConfigError::Validation(format!(
            "POOL_MAX_WAITING ({}) exceeds {}",
            pool.max_waiting, MAX_WAIT_QUEUE
        )));
    }
    let permits = u64::from(pool.max_connections) + u64::from(pool.max_waiting);
    if permits > Semaphore::MAX_PERMITS as u64 {
        return Err(ConfigError::Validation(format!(
            "POOL_MAX_CONNECTIONS + POOL_MAX_WAITING ({}) exceeds the admission limit",
            permits
        )));
    }
    for (name, value) in [
        ("POOL_ACQUIRE_TIMEOUT_SECS", pool.acquire_timeout),
        ("QUERY_TIMEOUT_SECS", pool.query_timeout),
    ] {
        if value.is_zero() {
            return Err(ConfigError::Validation(format!("{} must be at least 1", name)));
        }
    }
    if !timezone_pattern().is_match(&pool.session_timezone) {
        return Err(ConfigError::Validation(format!(
            "DB_SESSION_TIMEZONE is not a valid zone: {}",
            pool.session_timezone
        )));
    }

    Ok(())
}

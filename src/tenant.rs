//! Tenant identity, resolved routes, and the static per-brand table.

use crate::error::ResolutionError;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Default MySQL port used when neither config nor the routing authority names one.
pub const DEFAULT_DB_PORT: u16 = 3306;

fn tenant_key_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z0-9_-]{1,64}$").expect("static tenant key pattern"))
}

/// Upper-cased brand identifier. Only constructed through [`TenantKey::parse`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantKey(String);

impl TenantKey {
    /// Trim and upper-case `raw`. Empty input is `MissingTenantKey`; anything outside
    /// `[A-Z0-9_-]` cannot name a tenant and is `NotFound`.
    pub fn parse(raw: &str) -> Result<Self, ResolutionError> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(ResolutionError::MissingTenantKey);
        }
        if !tenant_key_pattern().is_match(&normalized) {
            return Err(ResolutionError::NotFound(normalized));
        }
        Ok(TenantKey(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Physical coordinates of a database target. Pools are keyed by this, not by tenant.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PhysicalKey {
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl fmt::Display for PhysicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Resolved connection coordinates for one tenant. Immutable; the secret is plaintext
/// and redacted from `Debug`.
#[derive(Debug)]
pub struct Route {
    pub tenant_key: TenantKey,
    pub host: String,
    pub port: u16,
    pub database_user: String,
    pub database_secret: SecretString,
    pub database_name: String,
}

impl Route {
    pub fn physical_key(&self) -> PhysicalKey {
        PhysicalKey {
            host: self.host.clone(),
            port: self.port,
            database: self.database_name.clone(),
        }
    }

    /// True when both routes point at the same target with the same credentials.
    pub fn same_target(&self, other: &Route) -> bool {
        self.tenant_key == other.tenant_key
            && self.physical_key() == other.physical_key()
            && self.database_user == other.database_user
            && self.database_secret.expose_secret() == other.database_secret.expose_secret()
    }
}

/// One statically configured brand. All fields must be non-empty to produce a route.
#[derive(Clone, Debug, Default)]
pub struct StaticTenantEntry {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl StaticTenantEntry {
    fn field(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn is_complete(&self) -> bool {
        Self::field(&self.host).is_some()
            && Self::field(&self.user).is_some()
            && Self::field(&self.password).is_some()
            && Self::field(&self.database).is_some()
    }

    /// Build a route when every required field is present; partial entries yield `None`.
    pub fn to_route(&self, tenant_key: &TenantKey) -> Option<Route> {
        Some(Route {
            tenant_key: tenant_key.clone(),
            host: Self::field(&self.host)?.to_string(),
            port: self.port.unwrap_or(DEFAULT_DB_PORT),
            database_user: Self::field(&self.user)?.to_string(),
            database_secret: SecretString::from(Self::field(&self.password)?.to_string()),
            database_name: Self::field(&self.database)?.to_string(),
        })
    }
}

/// In-memory brand table loaded from process configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticTenantTable {
    by_key: HashMap<TenantKey, StaticTenantEntry>,
}

impl StaticTenantTable {
    pub fn new() -> Self {
        StaticTenantTable {
            by_key: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: TenantKey, entry: StaticTenantEntry) {
        self.by_key.insert(key, entry);
    }

    pub fn get(&self, key: &TenantKey) -> Option<&StaticTenantEntry> {
        self.by_key.get(key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TenantKey> {
        self.by_key.keys()
    }
}

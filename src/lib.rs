//! Brand router: resolves a brand key to its database route and hands out
//! per-target connection pools, fail-closed at the request boundary.

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod extractors;
pub mod gate;
pub mod handlers;
pub mod lifecycle;
pub mod pool;
pub mod resolver;
pub mod response;
pub mod routes;
pub mod sql;
pub mod state;
pub mod tenant;

pub use config::RouterConfig;
pub use error::{AppError, ConfigError, GateError, PoolError, ResolutionError};
pub use extractors::tenant::{identity_from_gateway_headers, BrandContext, CallerIdentity};
pub use gate::brand_gate;
pub use lifecycle::{close_pools, drain_on, shutdown_signal};
pub use pool::{ExecutionFacade, PoolKey, PoolManager, QueryOptions, QueryOutcome, ShutdownReport};
pub use resolver::{HttpRoutingAuthority, RoutingAuthority, TenantResolver};
pub use routes::{app, brand_routes, common_routes, operator_routes};
pub use state::AppState;
pub use tenant::{Route, TenantKey};

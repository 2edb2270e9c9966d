use brand_router::config::RouterConfig;
use brand_router::pool::CloseOutcome;
use brand_router::{close_pools, AppState, PoolError, Route};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn config_with_brands() -> RouterConfig {
    let env: HashMap<&str, &str> = [
        ("BRAND_KEYS", "PTS,ACME,ZETA"),
        ("PTS_DB_HOST", "db-1.internal"),
        ("PTS_DB_USER", "pts_ro"),
        ("PTS_DB_PASSWORD", "a"),
        ("PTS_DB_NAME", "reports"),
        ("ACME_DB_HOST", "db-1.internal"),
        ("ACME_DB_USER", "acme_ro"),
        ("ACME_DB_PASSWORD", "b"),
        ("ACME_DB_NAME", "reports"),
        ("ZETA_DB_HOST", "db-2.internal"),
        ("ZETA_DB_USER", "zeta_ro"),
        ("ZETA_DB_PASSWORD", "c"),
        ("ZETA_DB_NAME", "zeta"),
    ]
    .into_iter()
    .collect();
    RouterConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap()
}

#[tokio::test]
async fn brands_on_one_target_connect_with_their_own_login() {
    let state = AppState::from_config(&config_with_brands()).unwrap();
    let pts = state.resolver.resolve("pts").await.unwrap();
    let acme = state.resolver.resolve("acme").await.unwrap();
    let zeta = state.resolver.resolve("zeta").await.unwrap();

    let a = state.pools.get_connection(&pts).unwrap();
    let b = state.pools.get_connection(&acme).unwrap();
    state.pools.get_connection(&zeta).unwrap();

    assert_eq!(a.target(), b.target());
    assert_eq!(a.pool_key().user, "pts_ro");
    assert_eq!(b.pool_key().user, "acme_ro");
    assert_eq!(state.pools.pool_count(), 3);

    let users: Vec<String> = state.pools.stats().into_iter().map(|s| s.user).collect();
    assert_eq!(users, ["acme_ro", "pts_ro", "zeta_ro"]);
}

#[tokio::test]
async fn invalidated_route_with_rotated_secret_replaces_the_pool() {
    let state = AppState::from_config(&config_with_brands()).unwrap();
    let route = state.resolver.resolve("pts").await.unwrap();
    state.pools.get_connection(&route).unwrap();

    let rotated = Arc::new(Route {
        tenant_key: route.tenant_key.clone(),
        host: route.host.clone(),
        port: route.port,
        database_user: route.database_user.clone(),
        database_secret: SecretString::from("rotated".to_string()),
        database_name: route.database_name.clone(),
    });
    let facade = state.pools.get_connection(&rotated).unwrap();
    assert_eq!(state.pools.pool_count(), 1);
    assert_eq!(facade.pool_key().user, "pts_ro");
}

#[tokio::test]
async fn concurrent_requests_for_a_new_brand_create_one_pool() {
    let state = AppState::from_config(&config_with_brands()).unwrap();
    let mut handles = Vec::new();
    for _ in 0..24 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let route = state.resolver.resolve("zeta").await.unwrap();
            state.pools.get_connection(&route).is_ok()
        }));
    }
    for h in handles {
        assert!(h.await.unwrap());
    }
    assert_eq!(state.pools.pool_count(), 1);
    assert_eq!(state.resolver.cache().len(), 1);
}

#[tokio::test]
async fn shutdown_drains_pools_and_refuses_new_connections() {
    let state = AppState::from_config(&config_with_brands()).unwrap();
    for brand in ["pts", "zeta"] {
        let route = state.resolver.resolve(brand).await.unwrap();
        state.pools.get_connection(&route).unwrap();
    }

    let report = close_pools(&state, Duration::from_millis(500)).await;
    assert_eq!(report.pools.len(), 2);
    assert!(report.pools.iter().all(|(_, o)| *o == CloseOutcome::Closed));
    assert_eq!(state.pools.open_connections(), 0);
    assert_eq!(state.pools.pool_count(), 0);

    let route = state.resolver.resolve("acme").await.unwrap();
    assert!(matches!(
        state.pools.get_connection(&route),
        Err(PoolError::ShuttingDown)
    ));
}

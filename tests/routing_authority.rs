use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use brand_router::codec;
use brand_router::config::{CacheConfig, RemoteConfig};
use brand_router::resolver::RemoteError;
use brand_router::tenant::StaticTenantTable;
use brand_router::{HttpRoutingAuthority, ResolutionError, RoutingAuthority, TenantKey, TenantResolver};
use secrecy::{ExposeSecret, SecretString};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const TOKEN: &str = "routing-token";
const CREDENTIAL_KEY: &str = "brand-credential-key";

async fn lookup(Path(brand): Path<String>, headers: HeaderMap) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TOKEN));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match brand.as_str() {
        "GHOST" => StatusCode::NOT_FOUND.into_response(),
        "OLDCO" => StatusCode::FORBIDDEN.into_response(),
        "SLOW" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            StatusCode::OK.into_response()
        }
        "GARBLED" => (StatusCode::OK, "<html>").into_response(),
        "BADSECRET" => Json(serde_json::json!({
            "host": "tenant-db-4.internal",
            "user": "brand_ro",
            "password": "badiv:badcipher",
            "database": "badsecret"
        }))
        .into_response(),
        _ => {
            let blob = codec::encrypt("s3cret", CREDENTIAL_KEY.as_bytes()).unwrap_or_default();
            Json(serde_json::json!({
                "host": "tenant-db-3.internal",
                "user": "brand_ro",
                "password": blob,
                "database": brand.to_lowercase()
            }))
            .into_response()
        }
    }
}

async fn spawn_authority() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/routes/:brand", get(lookup));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn remote_config(addr: SocketAddr, token: Option<&str>) -> RemoteConfig {
    RemoteConfig {
        base_url: format!("http://{}/routes/", addr),
        token: token.map(|t| SecretString::from(t.to_string())),
        timeout: Duration::from_secs(1),
    }
}

fn key(raw: &str) -> TenantKey {
    TenantKey::parse(raw).unwrap()
}

#[tokio::test]
async fn http_statuses_map_to_remote_errors() {
    let addr = spawn_authority().await;
    let authority = HttpRoutingAuthority::new(&remote_config(addr, Some(TOKEN))).unwrap();

    assert_eq!(authority.lookup(&key("ghost")).await.unwrap_err(), RemoteError::NotFound);
    assert_eq!(authority.lookup(&key("oldco")).await.unwrap_err(), RemoteError::Suspended);
    assert!(matches!(
        authority.lookup(&key("garbled")).await.unwrap_err(),
        RemoteError::Unavailable(_)
    ));

    let route = authority.lookup(&key("pts")).await.unwrap();
    assert_eq!(route.host.as_deref(), Some("tenant-db-3.internal"));
    assert_eq!(route.port, None);
}

#[tokio::test]
async fn slow_authority_times_out_as_unavailable() {
    let addr = spawn_authority().await;
    let authority = HttpRoutingAuthority::new(&remote_config(addr, Some(TOKEN))).unwrap();
    let err = authority.lookup(&key("slow")).await.unwrap_err();
    assert!(matches!(err, RemoteError::Unavailable(_)));
}

#[tokio::test]
async fn missing_bearer_token_is_unavailable() {
    let addr = spawn_authority().await;
    let authority = HttpRoutingAuthority::new(&remote_config(addr, None)).unwrap();
    assert!(matches!(
        authority.lookup(&key("pts")).await.unwrap_err(),
        RemoteError::Unavailable(_)
    ));
}

#[tokio::test]
async fn resolver_decrypts_remote_secret_and_defaults_port() {
    let addr = spawn_authority().await;
    let authority = Arc::new(HttpRoutingAuthority::new(&remote_config(addr, Some(TOKEN))).unwrap());
    let resolver = TenantResolver::new(&CacheConfig::default(), StaticTenantTable::new())
        .with_authority(authority, Some(SecretString::from(CREDENTIAL_KEY.to_string())));

    let route = resolver.resolve("pts").await.unwrap();
    assert_eq!(route.tenant_key.as_str(), "PTS");
    assert_eq!(route.port, 3306);
    assert_eq!(route.database_name, "pts");
    assert_eq!(route.database_secret.expose_secret(), "s3cret");

    assert_eq!(
        resolver.resolve("GHOST").await.unwrap_err(),
        ResolutionError::NotFound("GHOST".into())
    );
    assert_eq!(
        resolver.resolve("oldco").await.unwrap_err(),
        ResolutionError::Suspended("OLDCO".into())
    );
    assert_eq!(resolver.resolve("badsecret").await.unwrap_err().kind(), "routing_unavailable");
    assert_eq!(resolver.cache().len(), 1);
}

//! Brand-scoped handlers and operator endpoints for routes and pools.

use crate::error::AppError;
use crate::extractors::tenant::{BrandContext, CallerIdentity};
use crate::response::{success_many, success_one_ok, success_one_with_meta};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Extension;
use serde::Serialize;

#[derive(Serialize)]
struct ContextBody {
    brand_key: String,
    target: String,
    database: String,
}

/// GET /api/v1/brand/context — the brand and physical target this request is routed to.
pub async fn brand_context(ctx: BrandContext) -> impl IntoResponse {
    let route = ctx.facade.route();
    success_one_ok(ContextBody {
        brand_key: ctx.tenant_key.to_string(),
        target: ctx.facade.target(),
        database: route.database_name.clone(),
    })
}

/// GET /api/v1/brand/ping — round-trip through the brand's pool.
pub async fn brand_ping(ctx: BrandContext) -> Result<impl IntoResponse, AppError> {
    let rows = ctx.facade.fetch_all("SELECT 1 AS ok", &[]).await?;
    let ok = rows
        .first()
        .and_then(|row| row.get("ok"))
        .and_then(|v| v.as_i64())
        == Some(1);
    Ok(success_one_with_meta(
        serde_json::json!({ "ok": ok }),
        serde_json::json!({ "brand_key": ctx.tenant_key.as_str() }),
    ))
}

/// GET /api/v1/pools — one entry per physical target and login. Cross-tenant callers only.
pub async fn list_pools(
    State(state): State<AppState>,
    identity: Option<Extension<CallerIdentity>>,
) -> Result<impl IntoResponse, AppError> {
    CallerIdentity::require_operator(identity.as_ref().map(|Extension(c)| c))?;
    Ok(success_many(state.pools.stats()))
}

/// DELETE /api/v1/routes/:brand_key — drop a cached route. Cross-tenant callers only.
pub async fn invalidate_route(
    State(state): State<AppState>,
    identity: Option<Extension<CallerIdentity>>,
    Path(brand_key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let identity = CallerIdentity::require_operator(identity.as_ref().map(|Extension(c)| c))?;
    let removed = state.resolver.invalidate(&brand_key);
    tracing::info!(subject = %identity.subject, brand_key = %brand_key, removed, "route cache entry invalidated");
    Ok(success_one_ok(serde_json::json!({ "removed": removed })))
}

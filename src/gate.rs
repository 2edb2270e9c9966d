//! Brand context gate: turns a verified request into a resolved brand and facade, or
//! denies it. There is no default brand.

use crate::error::GateError;
use crate::extractors::tenant::{
    brand_key_from_body, brand_key_from_headers, brand_key_from_query, BrandContext, CallerIdentity,
};
use crate::state::AppState;
use crate::tenant::TenantKey;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

/// Upper bound on a JSON body buffered to look for `brand_key`.
pub const GATE_BODY_LIMIT: usize = 64 * 1024;

fn is_json(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().starts_with("application/json"))
}

/// Key sources in priority order: header, query, JSON body, then the caller's own brand.
/// The body is buffered only when it is JSON and is handed on unchanged.
async fn requested_key(request: Request, identity: &CallerIdentity) -> Result<(Option<String>, Request), GateError> {
    if let Some(key) = brand_key_from_headers(request.headers()) {
        return Ok((Some(key), request));
    }
    if let Some(key) = brand_key_from_query(request.uri()) {
        return Ok((Some(key), request));
    }
    let (key, request) = if is_json(&request) {
        let (parts, body) = request.into_parts();
        let bytes = to_bytes(body, GATE_BODY_LIMIT)
            .await
            .map_err(|_| GateError::BodyUnreadable(GATE_BODY_LIMIT))?;
        let key = brand_key_from_body(&bytes);
        (key, Request::from_parts(parts, Body::from(bytes)))
    } else {
        (None, request)
    };
    Ok((key.or_else(|| identity.tenant_key.clone()), request))
}

async fn admit(state: &AppState, request: Request) -> Result<(BrandContext, Request), GateError> {
    let identity = request
        .extensions()
        .get::<CallerIdentity>()
        .cloned()
        .ok_or(GateError::Unauthorized)?;

    let (raw, request) = requested_key(request, &identity).await?;
    let raw = raw.ok_or(GateError::TenantKeyRequired)?;
    let key = TenantKey::parse(&raw)?;
    identity.authorize(&key)?;

    let route = state.resolver.resolve(key.as_str()).await?;
    let facade = state.pools.get_connection(&route)?;
    Ok((BrandContext { tenant_key: key, facade }, request))
}

/// Middleware for brand-scoped routes. Expects [`CallerIdentity`] in extensions.
pub async fn brand_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match admit(&state, request).await {
        Ok((context, mut request)) => {
            tracing::debug!(%request_id, tenant = %context.tenant_key, %method, %path, "brand context attached");
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(err) => {
            let (status, code) = err.status_and_code();
            tracing::warn!(%request_id, %method, %path, status = status.as_u16(), code, error = %err, "request denied");
            err.into_response()
        }
    }
}

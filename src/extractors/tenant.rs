//! Caller identity, brand key sources, and the per-request brand context.

use crate::error::GateError;
use crate::pool::ExecutionFacade;
use crate::tenant::TenantKey;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query, Request},
    http::{request::Parts, HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;

/// Header naming the brand a request targets.
pub const BRAND_KEY_HEADER: &str = "X-Brand-Key";
/// Query parameter and JSON body field naming the brand.
pub const BRAND_KEY_FIELD: &str = "brand_key";

/// Headers a trusted gateway sets after verifying the caller.
pub const CALLER_SUBJECT_HEADER: &str = "X-Caller-Subject";
pub const CALLER_BRAND_HEADER: &str = "X-Caller-Brand";
pub const CALLER_SCOPE_HEADER: &str = "X-Caller-Scope";
const CROSS_TENANT_SCOPE: &str = "cross-tenant";

/// Verified caller, placed in request extensions by the authentication layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerIdentity {
    pub subject: String,
    /// Brand the caller belongs to, if any.
    pub tenant_key: Option<String>,
    /// Admin or service callers allowed to act on any brand.
    pub cross_tenant: bool,
}

impl CallerIdentity {
    pub fn bound(subject: impl Into<String>, tenant_key: impl Into<String>) -> Self {
        CallerIdentity {
            subject: subject.into(),
            tenant_key: Some(tenant_key.into()),
            cross_tenant: false,
        }
    }

    pub fn cross_tenant(subject: impl Into<String>) -> Self {
        CallerIdentity {
            subject: subject.into(),
            tenant_key: None,
            cross_tenant: true,
        }
    }

    /// Admit cross-tenant callers anywhere and bound callers to their own brand.
    /// A caller with neither is admitted nowhere.
    pub fn authorize(&self, requested: &TenantKey) -> Result<(), GateError> {
        if self.cross_tenant {
            return Ok(());
        }
        match self.tenant_key.as_deref().map(TenantKey::parse) {
            Some(Ok(bound)) if bound == *requested => Ok(()),
            _ => Err(GateError::TenantMismatch(requested.to_string())),
        }
    }

    /// Operator endpoints (pool stats, route invalidation) need cross-tenant scope.
    pub fn require_operator(identity: Option<&CallerIdentity>) -> Result<&CallerIdentity, GateError> {
        match identity {
            None => Err(GateError::Unauthorized),
            Some(caller) if caller.cross_tenant => Ok(caller),
            Some(_) => Err(GateError::OperatorOnly),
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn brand_key_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(BRAND_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(non_blank)
}

pub fn brand_key_from_query(uri: &Uri) -> Option<String> {
    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params.get(BRAND_KEY_FIELD).and_then(|v| non_blank(v))
}

/// `brand_key` from a JSON object body. Non-JSON or non-string values are ignored.
pub fn brand_key_from_body(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value.get(BRAND_KEY_FIELD)?.as_str().and_then(non_blank)
}

/// Trust identity headers from the fronting gateway. Requests without a subject get no
/// identity and are later refused by the brand gate.
pub async fn identity_from_gateway_headers(mut request: Request, next: Next) -> Response {
    let headers = request.headers();
    let subject = headers
        .get(CALLER_SUBJECT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(non_blank);
    if let Some(subject) = subject {
        let tenant_key = headers
            .get(CALLER_BRAND_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(non_blank);
        let cross_tenant = headers
            .get(CALLER_SCOPE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case(CROSS_TENANT_SCOPE));
        request.extensions_mut().insert(CallerIdentity {
            subject,
            tenant_key,
            cross_tenant,
        });
    }
    next.run(request).await
}

/// Resolved brand for the current request, attached by the brand gate.
#[derive(Clone, Debug)]
pub struct BrandContext {
    pub tenant_key: TenantKey,
    pub facade: ExecutionFacade,
}

#[async_trait]
impl<S> FromRequestParts<S> for BrandContext
where
    S: Send + Sync,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<BrandContext>()
            .cloned()
            .ok_or(GateError::MissingContext)
    }
}

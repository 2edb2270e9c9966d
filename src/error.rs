//! Typed errors and HTTP mapping.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Failure to turn a tenant key into a route. Never carries a partial route.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("tenant key is missing")]
    MissingTenantKey,
    #[error("tenant not found: {0}")]
    NotFound(String),
    #[error("tenant suspended: {0}")]
    Suspended(String),
    #[error("routing unavailable for {tenant}: {reason}")]
    RoutingUnavailable { tenant: String, reason: String },
}

impl ResolutionError {
    pub(crate) fn unavailable(tenant: impl Into<String>, reason: impl Into<String>) -> Self {
        ResolutionError::RoutingUnavailable {
            tenant: tenant.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolutionError::MissingTenantKey => "missing_tenant_key",
            ResolutionError::NotFound(_) => "not_found",
            ResolutionError::Suspended(_) => "suspended",
            ResolutionError::RoutingUnavailable { .. } => "routing_unavailable",
        }
    }
}

/// Execution and resource errors raised by the pool manager and its facades.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("timed out acquiring a connection to {0}")]
    AcquireTimeout(String),
    #[error("connection pool for {0} is exhausted")]
    PoolExhausted(String),
    #[error("query timed out after {0:?}")]
    QueryTimeout(Duration),
    #[error("pool manager is shutting down")]
    ShuttingDown,
    #[error("invalid database target: {0}")]
    InvalidTarget(String),
}

impl PoolError {
    /// Map an acquire-side driver error onto the resource taxonomy.
    pub(crate) fn from_acquire(err: sqlx::Error, target: &str) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => PoolError::AcquireTimeout(target.to_string()),
            sqlx::Error::PoolClosed => PoolError::ShuttingDown,
            other => PoolError::Query(other),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PoolError::Query(_) => "query_error",
            PoolError::AcquireTimeout(_) => "acquire_timeout",
            PoolError::PoolExhausted(_) => "pool_exhausted",
            PoolError::QueryTimeout(_) => "query_timeout",
            PoolError::ShuttingDown => "shutting_down",
            PoolError::InvalidTarget(_) => "invalid_target",
        }
    }
}

/// Denials produced by the brand context gate. Every variant rejects the request.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("caller identity is required")]
    Unauthorized,
    #[error("tenant key required")]
    TenantKeyRequired,
    #[error("caller is not bound to tenant {0}")]
    TenantMismatch(String),
    #[error("operator scope required")]
    OperatorOnly,
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("request body could not be read within {0} bytes")]
    BodyUnreadable(usize),
    #[error("brand context missing from request")]
    MissingContext,
}

/// Handler-level error: a gate denial or a failed tenant query.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

fn pool_status(err: &PoolError) -> StatusCode {
    match err {
        PoolError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PoolError::QueryTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        PoolError::InvalidTarget(_) => StatusCode::BAD_GATEWAY,
        PoolError::AcquireTimeout(_) | PoolError::PoolExhausted(_) | PoolError::ShuttingDown => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl GateError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            GateError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            GateError::TenantKeyRequired => (StatusCode::BAD_REQUEST, "tenant_key_required"),
            GateError::TenantMismatch(_) => (StatusCode::FORBIDDEN, "tenant_mismatch"),
            GateError::OperatorOnly => (StatusCode::FORBIDDEN, "operator_only"),
            GateError::Resolution(e) => match e {
                ResolutionError::MissingTenantKey => (StatusCode::BAD_REQUEST, "tenant_key_required"),
                ResolutionError::NotFound(_) => (StatusCode::NOT_FOUND, "unknown_tenant"),
                ResolutionError::Suspended(_) => (StatusCode::FORBIDDEN, "tenant_suspended"),
                ResolutionError::RoutingUnavailable { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "routing_unavailable")
                }
            },
            GateError::Pool(e) => (pool_status(e), e.kind()),
            GateError::BodyUnreadable(_) => (StatusCode::PAYLOAD_TOO_LARGE, "body_unreadable"),
            GateError::MissingContext => (StatusCode::INTERNAL_SERVER_ERROR, "brand_context_missing"),
        }
    }
}

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: code.to_string(),
            message,
            details: None,
        },
    };
    let mut response = (status, Json(body)).into_response();
    if status == StatusCode::SERVICE_UNAVAILABLE {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static("5"));
    }
    response
}

impl GateError {
    /// Message shown to the client. Routing details (hosts, upstream reasons) stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            GateError::Resolution(ResolutionError::RoutingUnavailable { tenant, .. }) => {
                format!("routing unavailable for tenant {}", tenant)
            }
            GateError::Pool(PoolError::Query(_)) => "query failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        error_response(status, code, self.public_message())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Gate(gate) => gate.status_and_code(),
            AppError::Pool(e) => (pool_status(e), e.kind()),
        };
        let message = match &self {
            AppError::Gate(gate) => gate.public_message(),
            AppError::Pool(PoolError::Query(_)) => "query failed".to_string(),
            AppError::Pool(e) => e.to_string(),
        };
        error_response(status, code, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_kinds_map_to_gate_statuses() {
        let cases = [
            (ResolutionError::MissingTenantKey, StatusCode::BAD_REQUEST, "tenant_key_required"),
            (ResolutionError::NotFound("GHOST".into()), StatusCode::NOT_FOUND, "unknown_tenant"),
            (ResolutionError::Suspended("OLDCO".into()), StatusCode::FORBIDDEN, "tenant_suspended"),
            (
                ResolutionError::unavailable("PTS", "timeout"),
                StatusCode::SERVICE_UNAVAILABLE,
                "routing_unavailable",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(GateError::from(err).status_and_code(), (status, code));
        }
    }

    #[test]
    fn unavailable_response_is_retryable_and_hides_reason() {
        let err = GateError::from(ResolutionError::unavailable("PTS", "connect to 10.0.0.7 refused"));
        assert!(!err.public_message().contains("10.0.0.7"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "5");
    }

    #[test]
    fn acquire_errors_map_to_resource_kinds() {
        assert_eq!(PoolError::from_acquire(sqlx::Error::PoolTimedOut, "db:3306/x").kind(), "acquire_timeout");
        assert_eq!(PoolError::from_acquire(sqlx::Error::PoolClosed, "db:3306/x").kind(), "shutting_down");
        assert_eq!(PoolError::from_acquire(sqlx::Error::RowNotFound, "db:3306/x").kind(), "query_error");
    }
}

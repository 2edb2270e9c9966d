pub mod brand;
pub mod common;

pub use brand::{brand_routes, operator_routes};
pub use common::common_routes;

use crate::gate::GATE_BODY_LIMIT;
use crate::state::AppState;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

/// Full application router. Callers add the layer that attaches `CallerIdentity`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .nest(
            "/api/v1",
            brand_routes(state.clone()).merge(operator_routes(state)),
        )
        .layer(RequestBodyLimitLayer::new(GATE_BODY_LIMIT))
}

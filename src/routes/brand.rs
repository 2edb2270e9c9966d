//! Brand-scoped routes behind the gate, plus operator routes for pools and cached routes.

use crate::gate::brand_gate;
use crate::handlers::brand::{brand_context, brand_ping, invalidate_route, list_pools};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{delete, get},
    Router,
};

pub fn brand_routes(state: AppState) -> Router {
    Router::new()
        .route("/brand/context", get(brand_context))
        .route("/brand/ping", get(brand_ping).post(brand_ping))
        .route_layer(middleware::from_fn_with_state(state.clone(), brand_gate))
        .with_state(state)
}

pub fn operator_routes(state: AppState) -> Router {
    Router::new()
        .route("/pools", get(list_pools))
        .route("/routes/:brand_key", delete(invalidate_route))
        .with_state(state)
}

//! brand-router server: loads config from the environment, serves brand-scoped routes,
//! and closes every tenant pool on SIGINT/SIGTERM.

use axum::middleware;
use brand_router::{app, close_pools, drain_on, identity_from_gateway_headers, shutdown_signal, AppState, RouterConfig};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("brand_router=info".parse()?))
        .init();

    let config = RouterConfig::from_env()?;
    let state = AppState::from_config(&config)?;

    let router = app(state.clone()).layer(middleware::from_fn(identity_from_gateway_headers));

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(drain_on(state.clone(), shutdown_signal()))
        .await?;

    let report = close_pools(&state, config.shutdown_grace).await;
    tracing::info!(
        closed = report.closed,
        timed_out = report.timed_out,
        "shutdown complete"
    );
    Ok(())
}

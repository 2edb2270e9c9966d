//! Process shutdown: wait for a signal, then drain every pool.

use crate::pool::{CloseOutcome, ShutdownReport};
use crate::state::AppState;
use std::future::Future;
use std::time::Duration;

/// Completes on SIGINT or SIGTERM. If a handler cannot be installed that source is
/// ignored rather than ending the server.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

/// Resolves when `signal` does, after marking the state as draining so `/ready`
/// reports 503 while the server finishes in-flight requests.
pub async fn drain_on<F>(state: AppState, signal: F)
where
    F: Future<Output = ()>,
{
    signal.await;
    state.begin_drain();
    tracing::info!("draining: readiness now reports shutting_down");
}

/// Close all pools once the server has stopped accepting requests.
pub async fn close_pools(state: &AppState, grace: Duration) -> ShutdownReport {
    let report = state.pools.shutdown(grace).await;
    for (target, outcome) in &report.pools {
        if *outcome == CloseOutcome::TimedOut {
            tracing::warn!(target_db = %target, "connections still checked out at shutdown");
        }
    }
    let remaining = state.pools.open_connections();
    if remaining > 0 {
        tracing::warn!(remaining, "connections open after shutdown");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::pool::PoolManager;
    use crate::resolver::TenantResolver;
    use crate::tenant::StaticTenantTable;

    fn state() -> AppState {
        let resolver = TenantResolver::new(&CacheConfig::default(), StaticTenantTable::new());
        AppState::new(resolver, PoolManager::new(Default::default()))
    }

    #[tokio::test]
    async fn signal_marks_state_draining_before_pools_close() {
        let state = state();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let drain = tokio::spawn(drain_on(state.clone(), async move {
            let _ = rx.await;
        }));
        tokio::task::yield_now().await;
        assert!(!state.is_draining());

        tx.send(()).unwrap();
        drain.await.unwrap();
        assert!(state.is_draining());
        assert!(!state.pools.is_closing());
    }

    #[tokio::test]
    async fn close_pools_reports_every_pool() {
        let state = state();
        let report = close_pools(&state, Duration::from_millis(200)).await;
        assert!(report.pools.is_empty());
        assert!(state.is_draining());
    }
}

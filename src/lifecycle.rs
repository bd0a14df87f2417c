//! Startup and shutdown orchestration: wires every component
//! together, spawns the background tasks, and drives a graceful shutdown on
//! SIGINT/SIGTERM.
//!
//! The `tokio::select!` shutdown race against the two listeners is the same
//! shape used to bring up the HTTP listener, the UDP ingest task, and the
//! snapshot coalescer together.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::signal;
use tracing::{info, warn};

use crate::app::AppState;
use crate::config::Config;
use crate::course::CourseStore;
use crate::ingest;
use crate::overrides::OverrideStore;
use crate::position_store::PositionStore;
use crate::registry::Registry;

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Build every stateful component and return the shared handle `main` wires
/// into the router and the background tasks.
pub async fn build_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let registry = Registry::load(config.events_file_path(), config.manager_password.clone()).await?;
    if !config.multi_event() {
        registry
            .bootstrap_single_event(config.admin_password.clone().unwrap_or_default(), config.owntracks_password.clone())
            .await;
    }
    let positions = PositionStore::new(config.fsync_track_log, !config.no_track_logs, !config.no_current);
    let overrides = OverrideStore::new();
    let course = CourseStore::new();
    Ok(AppState { config, registry, positions, overrides, course })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Run the server until shutdown is requested: HTTP listener, UDP listener
/// (unless `--no-http`/disabled), and the snapshot coalescer all run
/// concurrently; on shutdown every dirty snapshot is force-flushed before
/// the process exits.
pub async fn run(state: AppState, router: Router) -> anyhow::Result<()> {
    let positions = state.positions.clone();
    let snapshot_task = tokio::spawn(positions.clone().run_snapshot_writer(SNAPSHOT_INTERVAL));

    let udp_state = state.clone();
    let udp_task = tokio::spawn(ingest::run_udp_dispatcher(udp_state, state.config.port, state.config.workers));

    let http_task = if !state.config.no_http {
        let addr: SocketAddr = format!("0.0.0.0:{}", state.config.http_port()).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("HTTP listening on {addr}");
        let make_service = router.into_make_service_with_connect_info::<SocketAddr>();
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, make_service).with_graceful_shutdown(shutdown_signal()).await {
                warn!("HTTP server error: {e}");
            }
        }))
    } else {
        shutdown_signal().await;
        None
    };

    if let Some(http_task) = http_task {
        let _ = http_task.await;
    }

    snapshot_task.abort();
    udp_task.abort();

    tokio::time::sleep(SHUTDOWN_GRACE).await;
    positions.flush_all().await;
    info!("shutdown complete");
    Ok(())
}

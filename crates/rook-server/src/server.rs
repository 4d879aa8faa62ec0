//! Axum HTTP + WebSocket server.

use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use rook_store::GameRepo;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::handlers;
use crate::hub::{Hub, HubHandle};
use crate::retention;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Persisted games.
    pub repo: GameRepo,
    /// Broadcast hub for realtime sessions.
    pub hub: HubHandle,
    pub config: Arc<ServerConfig>,
    /// Prometheus handle, if a recorder was installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/new/{player}", get(handlers::new_game))
        .route("/view/{id}", get(handlers::view_game))
        .route("/play/{id}/{orig}/{dest}", get(handlers::play_game))
        .route("/challenge/new", get(handlers::new_challenge))
        .route("/challenge/{id}", get(handlers::view_challenge))
        .route("/connect/{id}", get(handlers::connect))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the hub, the optional retention sweeper and the listener.
///
/// Everything stops when `shutdown` is cancelled.
pub async fn start(
    config: ServerConfig,
    repo: GameRepo,
    metrics: Option<PrometheusHandle>,
    shutdown: CancellationToken,
) -> Result<ServerHandle, std::io::Error> {
    let (hub, hub_task) = Hub::spawn(config.hub_scope, config.hub_queue_capacity, shutdown.clone());

    let sweeper = config.retention.map(|retention| {
        retention::spawn_sweeper(repo.clone(), retention, config.sweep_interval, shutdown.clone())
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let state = AppState {
        repo,
        hub,
        config: Arc::new(config),
        metrics,
        start_time: Instant::now(),
    };
    let router = build_router(state);

    info!(addr = %local_addr, "rook server started");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            warn!(error = %e, "server stopped with error");
        }
        info!("rook server stopped");
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        server,
        hub: hub_task,
        sweeper,
    })
}

/// Handle returned by [`start`]; keeps background tasks reachable.
pub struct ServerHandle {
    pub port: u16,
    server: JoinHandle<()>,
    hub: JoinHandle<()>,
    sweeper: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Wait for every task to finish after shutdown was requested.
    pub async fn join(self) {
        for (name, task) in [("server", self.server), ("hub", self.hub)]
            .into_iter()
            .chain(self.sweeper.map(|t| ("sweeper", t)))
        {
            if let Err(e) = task.await {
                warn!(task = name, error = %e, "task ended abnormally");
            }
        }
    }
}

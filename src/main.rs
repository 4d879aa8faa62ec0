//! # rook
//!
//! Realtime chess server binary: loads settings, opens the game store and
//! serves HTTP + WebSocket until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rook_server::ServerConfig;
use rook_settings::RookSettings;
use rook_store::{Database, GameRepo};
use rook_telemetry::TelemetryConfig;
use tokio_util::sync::CancellationToken;

/// Realtime two-seat chess server.
#[derive(Parser, Debug)]
#[command(name = "rook", about = "Realtime two-seat chess server")]
struct Cli {
    /// Settings file (defaults to `~/.rook/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db: Option<String>,
}

impl Cli {
    /// Fold command-line flags into loaded settings.
    fn apply(&self, settings: &mut RookSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(db) = &self.db {
            settings.store.db_path.clone_from(db);
        }
    }
}

fn load(cli: &Cli) -> Result<RookSettings> {
    let mut settings = match &cli.config {
        Some(path) => rook_settings::load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => rook_settings::load_settings().context("failed to load settings")?,
    };
    cli.apply(&mut settings);
    settings.validate().context("invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    rook_telemetry::init_telemetry(&TelemetryConfig {
        level: settings.logging.level.clone(),
        json: settings.logging.json,
        modules: settings.logging.modules.clone(),
    })
    .context("failed to initialize logging")?;
    let metrics = rook_telemetry::install_metrics_recorder()
        .context("failed to install metrics recorder")?;

    let db_path = rook_settings::resolve_path(&settings.store.db_path);
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");
    let repo = GameRepo::new(db);
    repo.ensure_buckets().context("failed to create game buckets")?;

    let shutdown = CancellationToken::new();
    let handle = rook_server::start(
        ServerConfig::from(&settings),
        repo,
        Some(metrics),
        shutdown.clone(),
    )
    .await
    .context("failed to start server")?;
    tracing::info!(port = handle.port, "rook ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    shutdown.cancel();
    handle.join().await;

    tracing::info!("shutdown complete");
    Ok(())
}

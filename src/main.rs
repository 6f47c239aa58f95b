//! Car Combat Server - Authoritative simulation for vehicular combat
//!
//! Runs the fixed-step room simulation: cars, abilities, ability objects and
//! the collision rules between them. Snapshots are published on each room's
//! outbound channel for whatever transport sits in front of it.

mod app;
mod config;
mod game;
mod protocol;
mod util;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::{Config, LogFormat};
use crate::util::time::{init_server_time, uptime_secs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.log_level, config.log_format);
    init_server_time();

    info!("Starting Car Combat Server");
    info!(
        simulation_tps = config.simulation_tps,
        snapshot_tps = config.snapshot_tps,
        max_players = config.max_players_per_room,
        "Simulation settings"
    );

    let state = AppState::new(config)?;
    info!(abilities = state.abilities.len(), "Ability registry ready");

    let room = state.open_room();
    info!(room_id = %room.id, "Default room accepting players");

    shutdown_signal().await;

    info!(
        uptime_secs = uptime_secs(),
        rooms = state.rooms.active_rooms(),
        players = state.rooms.total_players(),
        "Server shutdown complete"
    );
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}

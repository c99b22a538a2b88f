//! Gateway server binary for the toroidal Game of Life engine.
//!
//! Serves remote runs until a `kill` command arrives or the process
//! receives Ctrl-C, which kills the active run first.

use std::path::Path;
use std::sync::Arc;

use gol_core::config::GolConfig;
use gol_gateway::{start_server, GatewayState};
use gol_types::Command;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application entry point for the gateway server.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or the server
/// cannot bind its address.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = GolConfig::load_or_default(Path::new("gol-config.yaml"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        host = config.server.host,
        port = config.server.port,
        workers = config.engine.workers,
        "gol-server starting"
    );

    let state = Arc::new(GatewayState::new(config.engine.clone()));

    let on_signal = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for Ctrl-C");
            return;
        }
        info!("Ctrl-C received");
        // A running game would hold the graceful shutdown open forever.
        if let Some(handle) = on_signal.active().await {
            if let Err(e) = handle.command(Command::Kill).await {
                warn!(run_id = %handle.id(), error = %e, "Active run did not acknowledge kill");
            }
        }
        on_signal.shut_down();
    });

    start_server(&config.server, state).await?;
    info!("gol-server shutdown complete");
    Ok(())
}

//! Controller binary for the toroidal Game of Life engine.
//!
//! Runs one game as configured in `gol-config.yaml`, either on the local
//! worker pool or on a remote gateway, and prints its progress.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `gol-config.yaml` and the environment
//! 2. Initialize structured logging (tracing)
//! 3. Start reading key presses from standard input
//! 4. Run the distributor and print its events until the stream closes

use std::path::Path;

use gol_core::config::GolConfig;
use gol_engine::distributor::{distributor, DistributorChannels};
use gol_engine::keys::spawn_stdin_keys;
use gol_engine::pgm::PgmStore;
use gol_types::{Event, Params};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use tracing_subscriber::EnvFilter;

/// Application entry point for the controller.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or the run fails.
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

    let params = Params {
        width: config.run.width,
        height: config.run.height,
        turns: config.run.turns,
        workers: config.engine.workers,
    };
    info!(
        mode = ?config.run.mode,
        width = params.width,
        height = params.height,
        turns = params.turns,
        workers = params.workers,
        "gol starting"
    );

    let (events, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            render(&event);
        }
    });

    let store = PgmStore::new(&config.io);
    let channels = DistributorChannels {
        events,
        keys: spawn_stdin_keys(),
    };
    let result = distributor(params, &config, &store, channels).await;

    // The stream closes once the run is over; drain it before exiting.
    printer.await?;
    let report = result?;
    info!(
        turn = report.turn,
        alive = report.alive,
        output = %report.output.display(),
        "gol shutdown complete"
    );
    Ok(())
}

/// Print an event for the user.
fn render(event: &Event) {
    match event {
        Event::CellFlipped { turn, cell } => trace!(turn, %cell, "Cell flipped"),
        Event::TurnComplete { turn } => debug!(turn, "Turn complete"),
        Event::AliveCellsCount { turn, count } => {
            println!("Completed Turns {turn:<8} Alive Cells {count}");
        }
        Event::StateChange { turn, phase } => println!("Completed Turns {turn:<8} {phase}"),
        Event::ImageOutputComplete { filename, .. } => println!("File {filename} output complete"),
        Event::FinalTurnComplete { turn, alive } => {
            println!("Final turn {turn}: {} cells alive", alive.len());
        }
    }
}

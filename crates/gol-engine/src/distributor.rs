//! The controller: runs one game end to end.
//!
//! The distributor reads the input image, runs the game either on the
//! in-process engine or on a remote gateway, turns key presses into
//! commands, samples the alive-cell count on a wall-clock ticker, and
//! writes the final image. It always finishes by emitting
//! `StateChange{Quitting}`; the event stream closes once the distributor
//! returns and the run's own senders are gone.
//!
//! # Event order
//!
//! A successful run ends with `FinalTurnComplete`, then the
//! `ImageOutputComplete` of the final image, then `StateChange{Quitting}`.
//! Locally the scheduler emits `StateChange{Executing}` and
//! `FinalTurnComplete` itself; remotely the distributor emits them.
//!
//! # Keys
//!
//! | Key | Local | Remote |
//! |-----|-------|--------|
//! | `s` | write an image of the current turn | same, from the server's snapshot |
//! | `p` | pause or resume, printing the turn | same |
//! | `q` | end the run, keep the result | same; the server keeps running |
//! | `k` | same as `q` | end the run and shut the server down |
//!
//! Keys are no longer read once a `q` or `k` has been acknowledged. If the
//! key stream ends while the run is paused, nobody could ever resume it,
//! so the distributor quits the run instead of waiting forever.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use gol_core::config::{GolConfig, RunMode};
use gol_core::control::{ControlError, RunHandle};
use gol_core::events::EventSink;
use gol_core::grid::Grid;
use gol_core::scheduler;
use gol_core::ticker::Ticker;
use gol_gateway::RemoteClient;
use gol_types::{Command, Event, Params, Phase};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::DistributorError;
use crate::pgm::{GridSink, GridSource, IoError};

/// Channels connecting the distributor to the outside world.
#[derive(Debug)]
pub struct DistributorChannels {
    /// Where telemetry events go. Closed once the run is over.
    pub events: mpsc::UnboundedSender<Event>,
    /// Key presses from the user.
    pub keys: mpsc::Receiver<char>,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Number of completed turns.
    pub turn: u64,
    /// Live cells in the final grid.
    pub alive: usize,
    /// Path of the final image.
    pub output: PathBuf,
}

/// Run one game from input image to final image.
///
/// # Errors
///
/// Returns [`DistributorError`] if the input image cannot be read, the run
/// fails, or the final image cannot be written. `StateChange{Quitting}` is
/// emitted in every case; a failed remote run writes no image.
pub async fn distributor<S>(
    params: Params,
    config: &GolConfig,
    store: &S,
    channels: DistributorChannels,
) -> Result<RunReport, DistributorError>
where
    S: GridSource + GridSink + Sync,
{
    let DistributorChannels { events, mut keys } = channels;

    info!(
        mode = ?config.run.mode,
        width = params.width,
        height = params.height,
        turns = params.turns,
        workers = params.workers,
        "Distributor starting"
    );

    let result = match config.run.mode {
        RunMode::Local => run_local(params, config, store, &events, &mut keys).await,
        RunMode::Remote => run_remote(params, config, store, &events, &mut keys).await,
    };

    let turn = result.as_ref().map_or(0, |report| report.turn);
    match &result {
        Ok(report) => info!(turn, alive = report.alive, output = %report.output.display(), "Run finished"),
        Err(e) => warn!(error = %e, "Run failed"),
    }
    events.emit(Event::StateChange {
        turn,
        phase: Phase::Quitting,
    });
    result
}

async fn run_local<S>(
    params: Params,
    config: &GolConfig,
    store: &S,
    events: &mpsc::UnboundedSender<Event>,
    keys: &mut mpsc::Receiver<char>,
) -> Result<RunReport, DistributorError>
where
    S: GridSource + GridSink + Sync,
{
    let grid = store.read_grid(&params)?;
    let sink: Arc<dyn EventSink> = Arc::new(events.clone());

    let run = scheduler::launch(grid, params, &config.engine, Arc::clone(&sink))?;
    let handle = run.handle().clone();
    let ticker = Ticker::spawn(handle.clone(), sink, config.engine.ticker_interval());

    let target = Target::Local(&handle);
    let outcome = drive(run.finish(), &target, &params, store, events, keys).await;
    ticker.stop().await;
    let outcome = outcome?;

    let output = write_image(store, events, &params, outcome.turn, &outcome.grid)?;
    Ok(RunReport {
        turn: outcome.turn,
        alive: outcome.grid.alive_count(),
        output,
    })
}

async fn run_remote<S>(
    params: Params,
    config: &GolConfig,
    store: &S,
    events: &mpsc::UnboundedSender<Event>,
    keys: &mut mpsc::Receiver<char>,
) -> Result<RunReport, DistributorError>
where
    S: GridSource + GridSink + Sync,
{
    let grid = store.read_grid(&params)?;
    events.emit(Event::StateChange {
        turn: 0,
        phase: Phase::Executing,
    });

    let client = Arc::new(RemoteClient::new(&config.client));
    info!(server = client.base_url(), "Running remotely");
    let ticker = Ticker::spawn(
        Arc::clone(&client),
        Arc::new(events.clone()),
        config.engine.ticker_interval(),
    );

    let target = Target::Remote(&client);
    let start = client.start(&params, &grid);
    let outcome = drive(start, &target, &params, store, events, keys).await;
    ticker.stop().await;
    let outcome = outcome?;

    events.emit(Event::FinalTurnComplete {
        turn: outcome.turn,
        alive: outcome.alive,
    });
    let output = write_image(store, events, &params, outcome.turn, &outcome.grid)?;
    Ok(RunReport {
        turn: outcome.turn,
        alive: outcome.grid.alive_count(),
        output,
    })
}

// ---------------------------------------------------------------------------
// Key handling
// ---------------------------------------------------------------------------

/// Run state as last acknowledged through a key.
#[derive(Debug, Default)]
struct KeyState {
    paused: bool,
    stopping: bool,
}

/// Serve key presses until `run` resolves.
async fn drive<F, S>(
    run: F,
    target: &Target<'_>,
    params: &Params,
    store: &S,
    events: &mpsc::UnboundedSender<Event>,
    keys: &mut mpsc::Receiver<char>,
) -> F::Output
where
    F: Future,
    S: GridSink,
{
    tokio::pin!(run);
    let mut state = KeyState::default();
    let mut keys_open = true;
    loop {
        tokio::select! {
            outcome = &mut run => return outcome,
            key = keys.recv(), if keys_open && !state.stopping => match key {
                Some(key) => on_key(key, target, params, store, events, &mut state).await,
                None => {
                    keys_open = false;
                    if state.paused {
                        quit_abandoned(target).await;
                    }
                }
            },
        }
    }
}

/// Quit a paused run whose key input has ended.
async fn quit_abandoned(target: &Target<'_>) {
    info!("Key input ended while paused, quitting");
    match target.apply(Command::Quit).await {
        Ok(applied) => info!(turn = applied.turn, "Run stopping"),
        Err(Rejected::Finished) => debug!("Run already finished"),
        Err(Rejected::Failed(reason)) => warn!(error = %reason, "Quit not applied"),
    }
}

/// Where commands are sent.
///
/// Uses enum dispatch because async methods are not dyn-compatible.
enum Target<'a> {
    Local(&'a RunHandle),
    Remote(&'a RemoteClient),
}

/// A command as acknowledged by the run.
struct Applied {
    turn: u64,
    paused: bool,
    snapshot: Option<Grid>,
}

/// Why a command was not applied.
enum Rejected {
    /// The run is already over.
    Finished,
    /// Anything else; the run continues.
    Failed(String),
}

impl Target<'_> {
    async fn apply(&self, command: Command) -> Result<Applied, Rejected> {
        match self {
            Self::Local(handle) => match handle.command(command).await {
                Ok(reply) => Ok(Applied {
                    turn: reply.turn,
                    paused: reply.paused,
                    snapshot: reply.snapshot.map(|world| world.grid),
                }),
                Err(ControlError::NoActiveRun) => Err(Rejected::Finished),
                Err(e) => Err(Rejected::Failed(e.to_string())),
            },
            Self::Remote(client) => match client.state(command).await {
                Ok(reply) => {
                    let snapshot = reply
                        .grid
                        .as_deref()
                        .map(Grid::from_rows)
                        .transpose()
                        .map_err(|e| Rejected::Failed(e.to_string()))?;
                    Ok(Applied {
                        turn: reply.turns.unwrap_or_default(),
                        paused: reply.paused,
                        snapshot,
                    })
                }
                Err(e) if e.is_no_active_run() => Err(Rejected::Finished),
                Err(e) => Err(Rejected::Failed(e.to_string())),
            },
        }
    }
}

async fn on_key<S: GridSink>(
    key: char,
    target: &Target<'_>,
    params: &Params,
    store: &S,
    events: &mpsc::UnboundedSender<Event>,
    state: &mut KeyState,
) {
    let Some(command) = Command::from_key(key) else {
        warn!(%key, "Ignoring unbound key");
        return;
    };

    let applied = match target.apply(command).await {
        Ok(applied) => applied,
        Err(Rejected::Finished) => {
            debug!(%command, "Run already finished");
            return;
        }
        Err(Rejected::Failed(reason)) => {
            warn!(%command, error = %reason, "Command not applied");
            return;
        }
    };

    state.paused = applied.paused;
    state.stopping = command.terminates();

    match command {
        Command::Save => match applied.snapshot {
            Some(grid) => {
                if let Err(e) = write_image(store, events, params, applied.turn, &grid) {
                    warn!(error = %e, "Saving image failed");
                }
            }
            None => warn!(turn = applied.turn, "Save returned no snapshot"),
        },
        Command::Pause if applied.paused => {
            println!("Paused at turn {}", applied.turn);
        }
        Command::Pause => {
            println!("Continuing from turn {}", applied.turn);
        }
        Command::Quit | Command::Kill => {
            info!(%command, turn = applied.turn, "Run stopping");
        }
    }
}

/// Write `grid` as the image of `turn` and announce it.
fn write_image<S: GridSink>(
    store: &S,
    events: &mpsc::UnboundedSender<Event>,
    params: &Params,
    turn: u64,
    grid: &Grid,
) -> Result<PathBuf, IoError> {
    let filename = params.output_name(turn);
    let path = store.write_grid(&filename, grid)?;
    events.emit(Event::ImageOutputComplete { turn, filename });
    Ok(path)
}

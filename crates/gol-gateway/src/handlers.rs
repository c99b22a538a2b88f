//! Endpoint handlers for the remote protocol.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/rpc/start` | Run a grid to completion and return the final grid |
//! | `POST` | `/rpc/alive-cells-count` | Alive-cell count of the active run |
//! | `POST` | `/rpc/state` | Apply `save`, `pause`, `quit` or `kill` |
//! | `GET` | `/health` | Whether the gateway accepts runs, and the active run |

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use gol_core::control::{CommandReply, RunHandle};
use gol_core::events::TracingSink;
use gol_core::grid::Grid;
use gol_core::scheduler;
use gol_types::{
    AliveCellsCountRequest, AliveCellsCountResponse, Command, HealthResponse, StartRequest,
    StartResponse, StateRequest, StateResponse,
};
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::state::GatewayState;

// ---------------------------------------------------------------------------
// POST /rpc/start
// ---------------------------------------------------------------------------

/// Run the supplied grid and answer once the run terminates.
///
/// The call is long-lived: it returns after the last turn, or after a
/// `quit` or `kill` sent through `/rpc/state`.
pub async fn start(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<StartResponse>, GatewayError> {
    let Json(request) = body?;
    let params = request.params();
    let grid = Grid::from_rows(&request.grid)?;

    let (handle, run) = state
        .begin_run(|| {
            let run = scheduler::launch(grid, params, &state.engine, Arc::new(TracingSink))?;
            Ok((run.handle().clone(), run))
        })
        .await?;
    info!(
        run_id = %handle.id(),
        width = params.width,
        height = params.height,
        turns = params.turns,
        threads = params.workers,
        "Start accepted"
    );

    let result = run.finish().await;
    state.end_run(handle.id()).await;
    let outcome = result?;
    info!(
        run_id = %outcome.id,
        turn = outcome.turn,
        reason = ?outcome.end_reason,
        "Start answered"
    );

    Ok(Json(StartResponse {
        alive: outcome.alive_cells(),
        updated_grid: outcome.grid.to_rows(),
        turns: outcome.turn,
    }))
}

// ---------------------------------------------------------------------------
// POST /rpc/alive-cells-count
// ---------------------------------------------------------------------------

/// Number of live cells of the active run at its latest turn boundary.
pub async fn alive_cells_count(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<AliveCellsCountRequest>, JsonRejection>,
) -> Result<Json<AliveCellsCountResponse>, GatewayError> {
    let Json(AliveCellsCountRequest {}) = body?;
    let handle = state.require_active().await?;
    let sample = handle.alive_cells_count().await?;
    Ok(Json(AliveCellsCountResponse {
        cells_alive: sample.alive_count,
        turns: sample.turn,
    }))
}

// ---------------------------------------------------------------------------
// POST /rpc/state
// ---------------------------------------------------------------------------

/// Apply a control command to the active run.
///
/// `kill` also stops the gateway: it accepts no further runs and shuts
/// down once in-flight calls have been answered. A `kill` with no active
/// run still shuts the gateway down.
pub async fn state_command(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<StateRequest>, JsonRejection>,
) -> Result<Json<StateResponse>, GatewayError> {
    let Json(request) = body?;
    let command: Command = request.command.parse().map_err(|e| {
        warn!(command = %request.command, "Ignoring invalid command");
        GatewayError::from(e)
    })?;

    if command == Command::Kill {
        return kill(&state).await;
    }

    let handle = state.require_active().await?;
    let reply = handle.command(command).await?;
    info!(run_id = %handle.id(), %command, turn = reply.turn, "Command applied");
    Ok(Json(state_response(reply)))
}

async fn kill(state: &GatewayState) -> Result<Json<StateResponse>, GatewayError> {
    let reply = match state.active().await {
        Some(handle) => match handle.command(Command::Kill).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!(run_id = %handle.id(), error = %e, "Kill was not acknowledged");
                None
            }
        },
        None => None,
    };
    state.shut_down();

    Ok(Json(reply.map_or_else(
        || StateResponse {
            message: Some("shutting down".to_owned()),
            ..StateResponse::default()
        },
        state_response,
    )))
}

fn state_response(reply: CommandReply) -> StateResponse {
    let message = match reply.command {
        Command::Save => format!("saved turn {}", reply.turn),
        Command::Pause if reply.paused => format!("paused at turn {}", reply.turn),
        Command::Pause => format!("resumed at turn {}", reply.turn),
        Command::Quit => format!("quitting at turn {}", reply.turn),
        Command::Kill => format!("killed at turn {}, shutting down", reply.turn),
    };
    StateResponse {
        grid: reply.snapshot.map(|world| world.grid.to_rows()),
        turns: Some(reply.turn),
        message: Some(message),
        paused: reply.paused,
    }
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Gateway status: whether runs are accepted, and the active run if any.
pub async fn health(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    let active = state.active().await;
    let turn = match &active {
        Some(handle) => handle.alive_cells_count().await.ok().map(|s| s.turn),
        None => None,
    };
    Json(HealthResponse {
        accepting: state.is_accepting(),
        active_run: active.as_ref().map(RunHandle::id),
        started_at: active.as_ref().map(RunHandle::started_at),
        turn,
    })
}

//! Request and response bodies of the remote protocol.
//!
//! Grids travel as row-major byte rows (`grid[y][x]`), each byte `0` or
//! `255`. Field names follow the protocol: `turns` is the turn the payload
//! refers to, `threads` the worker count requested for the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cell::Coord;
use crate::params::Params;
use crate::ids::RunId;

/// Body of `POST /rpc/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    /// Initial grid, one byte row per grid row.
    pub grid: Vec<Vec<u8>>,
    /// Number of turns to compute.
    pub turns: u64,
    /// Number of parallel row partitions.
    pub threads: usize,
    /// Grid width in cells.
    pub image_width: usize,
    /// Grid height in cells.
    pub image_height: usize,
}

impl StartRequest {
    /// Build a request from run parameters and a byte grid.
    pub fn new(params: &Params, grid: Vec<Vec<u8>>) -> Self {
        Self {
            grid,
            turns: params.turns,
            threads: params.workers,
            image_width: params.width,
            image_height: params.height,
        }
    }

    /// The run parameters carried by this request.
    pub const fn params(&self) -> Params {
        Params {
            width: self.image_width,
            height: self.image_height,
            turns: self.turns,
            workers: self.threads,
        }
    }
}

/// Response of `POST /rpc/start`, sent once the run terminates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResponse {
    /// The grid at the final turn.
    pub updated_grid: Vec<Vec<u8>>,
    /// Number of completed turns.
    pub turns: u64,
    /// Every live cell of the final grid.
    pub alive: Vec<Coord>,
}

/// Body of `POST /rpc/alive-cells-count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliveCellsCountRequest {}

/// Response of `POST /rpc/alive-cells-count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliveCellsCountResponse {
    /// Number of live cells.
    pub cells_alive: usize,
    /// The turn the count was taken at.
    pub turns: u64,
}

/// Body of `POST /rpc/state`.
///
/// The command stays a plain string so that an unknown command reaches
/// the gateway and is reported as `invalid_command` instead of failing
/// request deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRequest {
    /// One of `save`, `pause`, `quit`, `kill`.
    pub command: String,
}

/// Response of `POST /rpc/state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateResponse {
    /// Snapshot of the grid (for `save`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<Vec<Vec<u8>>>,
    /// The turn the response refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turns: Option<u64>,
    /// Human-readable outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Whether the run is paused after this command.
    #[serde(default)]
    pub paused: bool,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Whether the gateway accepts new `start` calls.
    pub accepting: bool,
    /// The active run, if any.
    pub active_run: Option<RunId>,
    /// When the active run was started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// The active run's current turn, if it answered in time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<u64>,
}

/// JSON error body returned by the gateway for every failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable description.
    pub error: String,
    /// Machine-readable error kind (e.g. `no_active_run`).
    pub kind: String,
    /// HTTP status code.
    pub status: u16,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn start_request_round_trips_params() {
        let params = Params {
            width: 4,
            height: 2,
            turns: 9,
            workers: 2,
        };
        let req = StartRequest::new(&params, vec![vec![0; 4]; 2]);
        assert_eq!(req.params(), params);
    }

    #[test]
    fn state_response_omits_empty_fields() {
        let resp = StateResponse {
            message: Some("quitting".to_owned()),
            ..StateResponse::default()
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("grid").is_none());
        assert!(json.get("turns").is_none());
        assert_eq!(json["message"], "quitting");
    }
}

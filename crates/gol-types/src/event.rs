//! Telemetry notifications emitted by a run.
//!
//! Every event carries the turn it refers to. Events of one kind may race
//! with events of another kind (cell flips come from worker threads, alive
//! counts from a wall-clock ticker), so consumers may only rely on the
//! relative order of [`Event::TurnComplete`] events.

use serde::{Deserialize, Serialize};

use crate::cell::Coord;

/// Execution phase reported by [`Event::StateChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Turns are being computed.
    Executing,
    /// The run is paused at a turn boundary.
    Paused,
    /// The run is shutting down.
    Quitting,
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Executing => f.write_str("Executing"),
            Self::Paused => f.write_str("Paused"),
            Self::Quitting => f.write_str("Quitting"),
        }
    }
}

/// A telemetry notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// A turn finished and its grid is now current.
    TurnComplete {
        /// The turn that completed.
        turn: u64,
    },
    /// A cell changed state while computing `turn`.
    CellFlipped {
        /// The turn being computed.
        turn: u64,
        /// The cell that flipped.
        cell: Coord,
    },
    /// Periodic sample of the number of live cells.
    AliveCellsCount {
        /// The turn the sample was taken at.
        turn: u64,
        /// Number of live cells.
        count: usize,
    },
    /// The run moved to a new phase.
    StateChange {
        /// The turn at which the change happened.
        turn: u64,
        /// The new phase.
        phase: Phase,
    },
    /// An image of the grid was written to disk.
    ImageOutputComplete {
        /// The turn the image shows.
        turn: u64,
        /// File name (without directory or extension).
        filename: String,
    },
    /// The run terminated; `alive` lists every live cell of the final grid.
    FinalTurnComplete {
        /// The number of completed turns.
        turn: u64,
        /// All live cells of the final grid.
        alive: Vec<Coord>,
    },
}

impl Event {
    /// The turn this event refers to.
    pub const fn turn(&self) -> u64 {
        match self {
            Self::TurnComplete { turn }
            | Self::CellFlipped { turn, .. }
            | Self::AliveCellsCount { turn, .. }
            | Self::StateChange { turn, .. }
            | Self::ImageOutputComplete { turn, .. }
            | Self::FinalTurnComplete { turn, .. } => *turn,
        }
    }
}

impl core::fmt::Display for Event {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TurnComplete { turn } => write!(f, "turn {turn} complete"),
            Self::CellFlipped { turn, cell } => write!(f, "turn {turn}: cell {cell} flipped"),
            Self::AliveCellsCount { turn, count } => {
                write!(f, "turn {turn}: {count} alive cells")
            }
            Self::StateChange { turn, phase } => write!(f, "turn {turn}: {phase}"),
            Self::ImageOutputComplete { turn, filename } => {
                write!(f, "turn {turn}: wrote {filename}")
            }
            Self::FinalTurnComplete { turn, alive } => {
                write!(f, "final turn {turn}: {} alive cells", alive.len())
            }
        }
    }
}

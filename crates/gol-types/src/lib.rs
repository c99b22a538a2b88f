//! Shared type definitions for the toroidal Game of Life engine.
//!
//! This crate is the single source of truth for the types that cross crate
//! boundaries: the engine core, the remote gateway, and the controller
//! binary all speak in these terms.
//!
//! # Modules
//!
//! - [`cell`] -- The two-valued [`Cell`] state and [`Coord`] positions
//! - [`command`] -- Control [`Command`]s and their string/key encodings
//! - [`event`] -- Telemetry [`Event`]s and run [`Phase`]s
//! - [`ids`] -- Type-safe run identifiers
//! - [`params`] -- Immutable run [`Params`] and state snapshots
//! - [`wire`] -- Request/response bodies of the remote protocol

pub mod cell;
pub mod command;
pub mod event;
pub mod ids;
pub mod params;
pub mod wire;

// Re-export all public types at crate root for convenience.
pub use cell::{Cell, CellError, Coord};
pub use command::{Command, InvalidCommand};
pub use event::{Event, Phase};
pub use ids::RunId;
pub use params::{GameState, Params, ParamsError};
pub use wire::{
    AliveCellsCountRequest, AliveCellsCountResponse, ErrorBody, HealthResponse, StartRequest,
    StartResponse, StateRequest, StateResponse,
};

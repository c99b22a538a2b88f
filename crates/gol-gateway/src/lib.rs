//! Remote execution gateway for the toroidal Game of Life engine.
//!
//! This crate provides both ends of the remote protocol:
//!
//! - **Server**: an Axum HTTP server that runs one game at a time on the
//!   in-process engine and exposes `start`, `alive-cells-count` and
//!   `state` as JSON `POST` endpoints, plus `GET /health`.
//! - **Client**: [`RemoteClient`], a `reqwest` caller used by the
//!   controller when it runs in remote mode.
//!
//! # Architecture
//!
//! The gateway keeps the [`RunHandle`] of the active run in its injected
//! [`GatewayState`]. Queries and commands are relayed to the run through
//! that handle, so they are answered at turn boundaries exactly as they
//! would be locally.
//!
//! [`RunHandle`]: gol_core::control::RunHandle

pub mod client;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

// Re-export primary types for convenience.
pub use client::{ClientError, RemoteClient, RemoteOutcome};
pub use error::GatewayError;
pub use router::build_router;
pub use server::{serve, start_server, ServerError};
pub use state::GatewayState;

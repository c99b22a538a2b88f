//! Turn kernel, worker-pool evolver, and control-plane scheduler for the
//! toroidal Game of Life engine.
//!
//! A run is launched with [`scheduler::launch`], which moves the grid onto
//! a blocking task and returns a [`control::RunHandle`]. The scheduler
//! advances turns with the worker-pool evolver and, between turns, answers
//! whatever the handle's callers have queued.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `gol-config.yaml` into
//!   strongly-typed structs.
//! - [`control`] -- The run inbox, [`RunHandle`], and bounded rendezvous
//!   queries.
//! - [`events`] -- The [`EventSink`] trait and its stock sinks.
//! - [`evolver`] -- One generation step split across a rayon worker pool.
//! - [`grid`] -- The toroidal grid, the Life rule, and the buffer pair.
//! - [`scheduler`] -- The turn loop and its Running/Paused/Terminated state
//!   machine.
//! - [`ticker`] -- Periodic alive-cell sampling.
//!
//! [`RunHandle`]: control::RunHandle
//! [`EventSink`]: events::EventSink

pub mod config;
pub mod control;
pub mod events;
pub mod evolver;
pub mod grid;
pub mod scheduler;
pub mod ticker;

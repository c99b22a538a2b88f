//! Controller side of the toroidal Game of Life engine.
//!
//! # Modules
//!
//! - [`distributor`] -- Runs one game end to end, locally or remotely.
//! - [`error`] -- [`DistributorError`].
//! - [`keys`] -- Key presses from standard input.
//! - [`pgm`] -- Binary PGM image I/O.
//!
//! [`DistributorError`]: error::DistributorError

pub mod distributor;
pub mod error;
pub mod keys;
pub mod pgm;

//! Error types for the controller.
//!
//! [`DistributorError`] wraps every way a controlled run can fail, so the
//! binaries can propagate it with `?`.

use gol_core::scheduler::SchedulerError;
use gol_gateway::ClientError;

use crate::pgm::IoError;

/// Top-level error of a controlled run.
#[derive(Debug, thiserror::Error)]
pub enum DistributorError {
    /// The input image could not be read, or an output image written.
    #[error("image error: {source}")]
    Image {
        /// The underlying image error.
        #[from]
        source: IoError,
    },

    /// The local run could not start or failed while computing.
    #[error("local run failed: {source}")]
    Local {
        /// The underlying scheduler error.
        #[from]
        source: SchedulerError,
    },

    /// The remote run failed. No output image is written.
    #[error("remote run failed: {source}")]
    Remote {
        /// The underlying client error.
        #[from]
        source: ClientError,
    },
}

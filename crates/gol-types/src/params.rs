//! Run parameters and derived state snapshots.

use serde::{Deserialize, Serialize};

/// Reasons a set of [`Params`] is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamsError {
    /// Width or height is zero.
    #[error("grid dimensions must be at least 1x1 (got {width}x{height})")]
    EmptyGrid {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
    },

    /// No workers were requested.
    #[error("worker count must be at least 1")]
    NoWorkers,
}

/// Parameters of one run. Immutable for the duration of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Grid width in cells.
    pub width: usize,
    /// Grid height in cells.
    pub height: usize,
    /// Number of turns to compute before terminating.
    pub turns: u64,
    /// Number of parallel row partitions per turn.
    pub workers: usize,
}

impl Params {
    /// Check the parameters and clamp the worker count to the grid height.
    ///
    /// A grid cannot be split into more non-empty row ranges than it has
    /// rows, so surplus workers are dropped rather than rejected.
    pub fn validated(self) -> Result<Self, ParamsError> {
        if self.width == 0 || self.height == 0 {
            return Err(ParamsError::EmptyGrid {
                width: self.width,
                height: self.height,
            });
        }
        if self.workers == 0 {
            return Err(ParamsError::NoWorkers);
        }
        Ok(Self {
            workers: self.workers.min(self.height),
            ..self
        })
    }

    /// The image file stem for the input grid: height first, e.g. `512x512`.
    pub fn input_name(&self) -> String {
        format!("{}x{}", self.height, self.width)
    }

    /// The image file stem for a grid at `turn`, e.g. `512x512x100`.
    pub fn output_name(&self, turn: u64) -> String {
        format!("{}x{}x{}", self.height, self.width, turn)
    }
}

/// Alive-cell count at a turn boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Number of live cells.
    pub alive_count: usize,
    /// The turn the count was taken at.
    pub turn: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn params(width: usize, height: usize, workers: usize) -> Params {
        Params {
            width,
            height,
            turns: 10,
            workers,
        }
    }

    #[test]
    fn valid_params_pass_through() {
        let p = params(16, 16, 4).validated().unwrap();
        assert_eq!(p.workers, 4);
    }

    #[test]
    fn workers_are_clamped_to_height() {
        let p = params(16, 3, 8).validated().unwrap();
        assert_eq!(p.workers, 3);
    }

    #[test]
    fn zero_workers_rejected() {
        assert_eq!(params(16, 16, 0).validated(), Err(ParamsError::NoWorkers));
    }

    #[test]
    fn empty_grid_rejected() {
        assert!(matches!(
            params(0, 16, 1).validated(),
            Err(ParamsError::EmptyGrid { .. })
        ));
    }

    #[test]
    fn image_names_put_height_first() {
        let p = params(64, 32, 1);
        assert_eq!(p.input_name(), "32x64");
        assert_eq!(p.output_name(100), "32x64x100");
    }
}

//! Worker-pool evolver: one generation step split across parallel workers.
//!
//! Rows `[0, H)` are cut into `workers` contiguous ranges of `H / workers`
//! rows; the last range also takes the `H % workers` leftover rows. Each
//! range becomes one rayon task, which
//!
//! - reads only the current grid (shared, immutable for the whole step),
//! - writes only its own slice of the next grid (the slices come from
//!   splitting the next grid's storage, so write sets are disjoint and no
//!   lock is needed),
//! - emits a [`Event::CellFlipped`] for every cell it changes.
//!
//! [`step`] returns only after every task has finished. That is the turn
//! barrier: nothing may read the next grid before it. The tasks run on
//! whatever rayon pool is current, so a caller that wants exactly
//! `workers` threads runs the step inside its own pool (see
//! [`worker_pool`]).

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};

use gol_types::{Cell, Coord, Event};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tracing::error;

use crate::events::EventSink;
use crate::grid::{neighbour_count, next_cell_state, Grid};

/// Errors that can occur during a step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvolveError {
    /// The two buffers have different dimensions.
    #[error("buffer size mismatch: current {current:?}, next {next:?}")]
    SizeMismatch {
        /// `(width, height)` of the current grid.
        current: (usize, usize),
        /// `(width, height)` of the next grid.
        next: (usize, usize),
    },

    /// The row partition does not fit the next buffer.
    #[error("partition {worker} (rows {rows:?}) exceeds the grid")]
    PartitionOutOfBounds {
        /// Index of the worker.
        worker: usize,
        /// Its row range.
        rows: Range<usize>,
    },

    /// A worker panicked. The step is void.
    #[error("worker {worker} panicked while computing turn {turn}")]
    WorkerPanicked {
        /// Index of the worker.
        worker: usize,
        /// The turn being computed.
        turn: u64,
    },
}

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSummary {
    /// The turn that was computed.
    pub turn: u64,
    /// Number of cells that changed state.
    pub flipped: usize,
}

/// Split `[0, height)` into `workers` contiguous row ranges.
///
/// Every range holds `height / workers` rows except the last, which also
/// absorbs `height % workers`. The ranges are non-overlapping and cover
/// every row exactly once. `workers` is clamped to `1..=height`, so no
/// range is ever empty (unless `height` is 0, which yields no ranges).
pub fn partition_rows(height: usize, workers: usize) -> Vec<Range<usize>> {
    if height == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, height);
    let base = height.checked_div(workers).unwrap_or(height);

    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0usize;
    for worker in 1..=workers {
        let end = if worker == workers {
            height
        } else {
            start.saturating_add(base)
        };
        ranges.push(start..end);
        start = end;
    }
    ranges
}

/// Build a rayon pool with one thread per worker.
///
/// # Errors
///
/// Returns the pool builder's error if the threads cannot be spawned.
pub fn worker_pool(workers: usize) -> Result<ThreadPool, ThreadPoolBuildError> {
    ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|index| format!("gol-worker-{index}"))
        .build()
}

/// Compute turn `turn` from `current` into `next` as `workers` row tasks.
///
/// `next` must have the same dimensions as `current`. Its previous content
/// is fully overwritten.
///
/// # Errors
///
/// Returns [`EvolveError::WorkerPanicked`] if any worker panics; `next` is
/// then in an unspecified state and must not be swapped in.
pub fn step(
    current: &Grid,
    next: &mut Grid,
    workers: usize,
    turn: u64,
    sink: &dyn EventSink,
) -> Result<StepSummary, EvolveError> {
    let dims = (current.width(), current.height());
    if dims != (next.width(), next.height()) {
        return Err(EvolveError::SizeMismatch {
            current: dims,
            next: (next.width(), next.height()),
        });
    }

    let width = current.width();
    let ranges = partition_rows(current.height(), workers);

    let mut remaining: &mut [Cell] = next.cells_mut();
    let mut tasks = Vec::with_capacity(ranges.len());
    for (worker, rows) in ranges.into_iter().enumerate() {
        let len = rows.len().saturating_mul(width);
        let (slice, tail) = std::mem::take(&mut remaining)
            .split_at_mut_checked(len)
            .ok_or_else(|| EvolveError::PartitionOutOfBounds {
                worker,
                rows: rows.clone(),
            })?;
        remaining = tail;
        tasks.push((rows, slice));
    }

    let sink = sink.wants_cell_flips().then_some(sink);
    let results: Vec<Result<usize, EvolveError>> = tasks
        .into_par_iter()
        .enumerate()
        .map(|(worker, (rows, slice))| {
            panic::catch_unwind(AssertUnwindSafe(move || {
                evolve_rows(current, rows, slice, turn, sink)
            }))
            .map_err(|_panic| {
                error!(worker, turn, "Worker panicked");
                EvolveError::WorkerPanicked { worker, turn }
            })
        })
        .collect();

    let mut flipped = 0usize;
    for result in results {
        flipped = flipped.saturating_add(result?);
    }
    Ok(StepSummary { turn, flipped })
}

/// Compute `rows` of the next generation into `out`.
///
/// `out` is the next grid's storage for exactly these rows. Returns the
/// number of flipped cells.
fn evolve_rows(
    current: &Grid,
    rows: Range<usize>,
    out: &mut [Cell],
    turn: u64,
    sink: Option<&dyn EventSink>,
) -> usize {
    let width = current.width();
    let mut flipped = 0usize;

    for (y, out_row) in rows.zip(out.chunks_mut(width)) {
        for (x, (slot, &before)) in out_row.iter_mut().zip(current.row(y)).enumerate() {
            let after = next_cell_state(before, neighbour_count(current, x, y));
            *slot = after;
            if after != before {
                flipped = flipped.saturating_add(1);
                if let Some(sink) = sink {
                    sink.emit(Event::CellFlipped {
                        turn,
                        cell: Coord::new(x, y),
                    });
                }
            }
        }
    }
    flipped
}

//! Event sinks: where a run's telemetry goes.
//!
//! The scheduler and its workers only know the [`EventSink`] trait. The
//! controller plugs in an unbounded channel sender, the gateway plugs in a
//! [`TracingSink`] (there is nobody on the server to stream events to), and
//! callers that want nothing use [`NullSink`].
//!
//! Sinks must be `Send + Sync`: cell flips are emitted concurrently from
//! every worker thread of a turn.

use gol_types::Event;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, Level};

/// Destination for telemetry events.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Delivery is best-effort and at-most-once.
    fn emit(&self, event: Event);

    /// Whether this sink wants per-cell flip events.
    ///
    /// Workers skip building [`Event::CellFlipped`] values entirely when
    /// this is `false`, which matters on large grids.
    fn wants_cell_flips(&self) -> bool {
        true
    }
}

impl EventSink for mpsc::UnboundedSender<Event> {
    fn emit(&self, event: Event) {
        // A closed receiver means the consumer stopped listening; the run
        // itself is unaffected.
        if self.send(event).is_err() {
            trace!("event receiver closed, event dropped");
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}

    fn wants_cell_flips(&self) -> bool {
        false
    }
}

/// Renders events as log lines.
///
/// Turn completions log at `debug`, cell flips at `trace` (and are only
/// produced when `trace` is enabled), everything else at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        match &event {
            Event::CellFlipped { turn, cell } => trace!(turn, %cell, "Cell flipped"),
            Event::TurnComplete { turn } => debug!(turn, "Turn complete"),
            Event::FinalTurnComplete { turn, alive } => {
                info!(turn, alive = alive.len(), "Final turn complete");
            }
            other => info!(turn = other.turn(), event = %other, "Run event"),
        }
    }

    fn wants_cell_flips(&self) -> bool {
        tracing::enabled!(Level::TRACE)
    }
}

//! Wall-clock alive-cell ticker.
//!
//! Every `period` the ticker samples the run through an [`AliveCountSource`]
//! and emits an [`Event::AliveCellsCount`]. A sample is a rendezvous query,
//! so it is answered at a turn boundary and never sees a half-computed
//! grid. The ticker stops on its own once the source reports the run has
//! finished, or when [`Ticker::stop`] is called.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gol_types::{Event, GameState};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::control::{ControlError, RunHandle};
use crate::events::EventSink;

/// Why a sample could not be taken.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SampleError {
    /// The run is over; no further samples will succeed.
    #[error("run finished")]
    Finished,

    /// This sample failed but later ones may succeed.
    #[error("sample failed: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },
}

/// Something that can report the alive-cell count of a running game.
pub trait AliveCountSource: Send + Sync + 'static {
    /// Take one sample.
    fn sample(&self) -> impl Future<Output = Result<GameState, SampleError>> + Send;
}

impl AliveCountSource for RunHandle {
    async fn sample(&self) -> Result<GameState, SampleError> {
        self.alive_cells_count().await.map_err(|e| match e {
            ControlError::NoActiveRun => SampleError::Finished,
            other => SampleError::Transient {
                message: other.to_string(),
            },
        })
    }
}

impl<T: AliveCountSource> AliveCountSource for Arc<T> {
    fn sample(&self) -> impl Future<Output = Result<GameState, SampleError>> + Send {
        T::sample(self)
    }
}

/// A running ticker task.
#[derive(Debug)]
pub struct Ticker {
    stop: oneshot::Sender<()>,
    task: JoinHandle<u64>,
}

impl Ticker {
    /// Start sampling `source` every `period`, the first sample one period
    /// from now.
    pub fn spawn<S: AliveCountSource>(
        source: S,
        sink: Arc<dyn EventSink>,
        period: Duration,
    ) -> Self {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(run_ticker(source, sink, period, stopped));
        Self { stop, task }
    }

    /// Stop the ticker and wait for it. Returns the number of samples
    /// emitted.
    pub async fn stop(self) -> u64 {
        // The task may already have exited on its own.
        let _ = self.stop.send(());
        self.task.await.unwrap_or_default()
    }
}

async fn run_ticker<S: AliveCountSource>(
    source: S,
    sink: Arc<dyn EventSink>,
    period: Duration,
    mut stopped: oneshot::Receiver<()>,
) -> u64 {
    let period = period.max(Duration::from_millis(1));
    let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut emitted = 0u64;
    loop {
        tokio::select! {
            _ = &mut stopped => break,
            _ = interval.tick() => {}
        }

        match source.sample().await {
            Ok(state) => {
                sink.emit(Event::AliveCellsCount {
                    turn: state.turn,
                    count: state.alive_count,
                });
                emitted = emitted.saturating_add(1);
            }
            Err(SampleError::Finished) => break,
            Err(SampleError::Transient { message }) => {
                warn!(error = %message, "Alive-cell sample failed");
            }
        }
    }
    debug!(emitted, "Ticker stopped");
    emitted
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::mpsc;

    /// Reports an increasing turn, then finishes.
    struct Counting {
        calls: AtomicU64,
        finish_after: u64,
    }

    impl AliveCountSource for Counting {
        async fn sample(&self) -> Result<GameState, SampleError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.finish_after {
                return Err(SampleError::Finished);
            }
            if call == 1 {
                return Err(SampleError::Transient {
                    message: "slow".to_owned(),
                });
            }
            Ok(GameState {
                alive_count: 10,
                turn: call,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn emits_samples_until_finished() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = Counting {
            calls: AtomicU64::new(0),
            finish_after: 4,
        };
        let ticker = Ticker::spawn(source, Arc::new(tx), Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(60)).await;

        // Calls 0, 2, 3 succeed; call 1 is transient; call 4 finishes.
        assert_eq!(ticker.stop().await, 3);
        let mut turns = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                Event::AliveCellsCount { turn, count } => {
                    assert_eq!(count, 10);
                    turns.push(turn);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(turns, vec![0, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_sample_before_first_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = Counting {
            calls: AtomicU64::new(0),
            finish_after: u64::MAX,
        };
        let ticker = Ticker::spawn(source, Arc::new(tx), Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(ticker.stop().await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_run_stops_ticker() {
        let (handle, mut inbox) = RunHandle::channel(1, Duration::from_millis(100));
        inbox.close();
        let ticker = Ticker::spawn(handle, Arc::new(crate::events::NullSink), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticker.stop().await, 0);
    }
}

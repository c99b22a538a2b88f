//! Control plane of a run: the inbox and the [`RunHandle`].
//!
//! A run owns a single-consumer [`Inbox`] of [`ControlRequest`]s. The
//! scheduler drains it only at turn boundaries, with a non-blocking
//! [`Inbox::try_next`] while running and a blocking [`Inbox::wait_next`]
//! while paused. Nothing in here touches the grid mid-turn.
//!
//! Callers talk to the run through a cloneable [`RunHandle`]. Every call is
//! a rendezvous: the request carries a oneshot reply channel and the
//! caller waits for the scheduler to answer it. That wait is always
//! bounded by the handle's timeout, and a run that has terminated (its
//! inbox is closed) answers immediately with [`ControlError::NoActiveRun`].
//!
//! # Architecture
//!
//! The handle is an explicit object passed to whoever needs to reach the
//! run (the gateway, the ticker, the controller), so there is no global
//! registry of live channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gol_types::{Command, GameState, RunId};
use tokio::sync::{mpsc, oneshot};

use crate::grid::Grid;

/// Errors returned to callers of a [`RunHandle`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// The run has terminated (or never started); nobody will answer.
    #[error("no active run")]
    NoActiveRun,

    /// The run did not answer within the bounded wait.
    #[error("run did not answer within {waited_ms}ms")]
    Timeout {
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// A pause is already in flight and has not been acknowledged.
    #[error("a pause request is already pending")]
    PauseAlreadyPending,
}

/// A full copy of the grid at a turn boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldState {
    /// The grid.
    pub grid: Grid,
    /// The turn the grid belongs to.
    pub turn: u64,
}

/// The scheduler's answer to a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    /// The command that was applied.
    pub command: Command,
    /// The turn at which it was applied.
    pub turn: u64,
    /// Whether the run is paused after the command.
    pub paused: bool,
    /// Snapshot of the world (only for [`Command::Save`]).
    pub snapshot: Option<WorldState>,
}

/// A request sitting in a run's inbox.
#[derive(Debug)]
pub enum ControlRequest {
    /// Count live cells.
    AliveCount {
        /// Where to send the answer.
        reply: oneshot::Sender<GameState>,
    },
    /// Copy the whole grid.
    Snapshot {
        /// Where to send the answer.
        reply: oneshot::Sender<WorldState>,
    },
    /// Apply a command.
    Command {
        /// The command.
        command: Command,
        /// Where to send the answer.
        reply: oneshot::Sender<CommandReply>,
    },
}

/// Receiving half of a run's control channel, owned by the scheduler.
///
/// Taking a `Pause` out of the inbox releases the run's pending-pause
/// flag, so a pause counts as pending for as long as it sits in the queue.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::Receiver<ControlRequest>,
    pause_pending: Arc<AtomicBool>,
}

impl Inbox {
    /// Take the next pending request without blocking.
    ///
    /// Returns `None` if nothing is waiting.
    pub fn try_next(&mut self) -> Option<ControlRequest> {
        let request = self.rx.try_recv().ok();
        self.dequeued(request)
    }

    /// Block the current thread until a request arrives.
    ///
    /// Returns `None` once every [`RunHandle`] has been dropped, since no
    /// request can ever arrive after that. Must not be called from inside
    /// an async task.
    pub fn wait_next(&mut self) -> Option<ControlRequest> {
        let request = self.rx.blocking_recv();
        self.dequeued(request)
    }

    /// Close the inbox and drop everything still queued.
    ///
    /// Callers waiting on a dropped request, and every later caller, get
    /// [`ControlError::NoActiveRun`].
    pub fn close(&mut self) -> usize {
        self.rx.close();
        let mut dropped = 0usize;
        while self.rx.try_recv().is_ok() {
            dropped = dropped.saturating_add(1);
        }
        self.pause_pending.store(false, Ordering::Release);
        dropped
    }

    fn dequeued(&self, request: Option<ControlRequest>) -> Option<ControlRequest> {
        if let Some(ControlRequest::Command {
            command: Command::Pause,
            ..
        }) = &request
        {
            self.pause_pending.store(false, Ordering::Release);
        }
        request
    }
}

/// Cloneable handle used to query and command an active run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: RunId,
    started_at: DateTime<Utc>,
    tx: mpsc::Sender<ControlRequest>,
    timeout: Duration,
    pause_pending: Arc<AtomicBool>,
}

/// Clears the pending-pause flag if the pause never reached the inbox.
///
/// Once queued, the flag belongs to the [`Inbox`], which clears it when the
/// request is taken out or dropped at close.
struct PauseGuard<'a> {
    pending: &'a AtomicBool,
    queued: bool,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        if !self.queued {
            self.pending.store(false, Ordering::Release);
        }
    }
}

impl RunHandle {
    /// Create a control channel: the handle for callers and the inbox for
    /// the scheduler.
    pub fn channel(capacity: usize, timeout: Duration) -> (Self, Inbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let pause_pending = Arc::new(AtomicBool::new(false));
        let handle = Self {
            id: RunId::new(),
            started_at: Utc::now(),
            tx,
            timeout,
            pause_pending: Arc::clone(&pause_pending),
        };
        (handle, Inbox { rx, pause_pending })
    }

    /// The run's identifier.
    pub const fn id(&self) -> RunId {
        self.id
    }

    /// Wall-clock time the run was created.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the run has terminated and closed its inbox.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Number of live cells and the turn they were counted at.
    pub async fn alive_cells_count(&self) -> Result<GameState, ControlError> {
        self.rendezvous(|reply| ControlRequest::AliveCount { reply }, None)
            .await
    }

    /// A copy of the grid and its turn.
    pub async fn world_state(&self) -> Result<WorldState, ControlError> {
        self.rendezvous(|reply| ControlRequest::Snapshot { reply }, None)
            .await
    }

    /// Apply a command at the next turn boundary and wait for the answer.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::PauseAlreadyPending`] if `command` is
    /// [`Command::Pause`] and another pause through any clone of this
    /// handle is still waiting in the inbox. A pause that timed out stays
    /// pending until the run takes it.
    pub async fn command(&self, command: Command) -> Result<CommandReply, ControlError> {
        let mut guard = if command == Command::Pause {
            if self
                .pause_pending
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                if self.is_closed() {
                    return Err(ControlError::NoActiveRun);
                }
                return Err(ControlError::PauseAlreadyPending);
            }
            Some(PauseGuard {
                pending: &self.pause_pending,
                queued: false,
            })
        } else {
            None
        };

        self.rendezvous(
            |reply| ControlRequest::Command { command, reply },
            guard.as_mut(),
        )
        .await
    }

    /// Send a request and wait, bounded, for its reply.
    async fn rendezvous<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ControlRequest,
        guard: Option<&mut PauseGuard<'_>>,
    ) -> Result<T, ControlError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = build(reply_tx);

        let exchange = async {
            self.tx
                .send(request)
                .await
                .map_err(|_closed| ControlError::NoActiveRun)?;
            if let Some(guard) = guard {
                guard.queued = true;
            }
            reply_rx.await.map_err(|_dropped| ControlError::NoActiveRun)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_elapsed| ControlError::Timeout {
                waited_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }
}

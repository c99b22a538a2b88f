//! Turn scheduler: the control-plane loop that drives a run.
//!
//! This module provides [`Scheduler::run`], the loop that advances turns
//! and services control requests, and [`launch`], which starts a run on a
//! blocking task and hands back its [`RunHandle`].
//!
//! # State machine
//!
//! - **Running**: compute one turn, swap buffers, emit `TurnComplete`, then
//!   take at most one pending request from the inbox without blocking.
//! - **Paused**: block on the inbox. Queries see the grid frozen at the
//!   turn the pause took effect. `Pause` again resumes.
//! - **Terminated**: absorbing. Reached when the turn limit is hit or on
//!   `Quit`/`Kill`. Emits `FinalTurnComplete`, closes the inbox, and
//!   returns the final grid.
//!
//! Requests only ever take effect between turns, never while workers hold
//! the buffers, so the scheduler is the sole writer of the run state and
//! needs no locks.

use std::sync::Arc;

use gol_types::{Command, Coord, Event, GameState, Params, ParamsError, Phase, RunId};
use rayon::{ThreadPool, ThreadPoolBuildError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::control::{CommandReply, ControlRequest, Inbox, RunHandle, WorldState};
use crate::events::EventSink;
use crate::evolver::{self, EvolveError};
use crate::grid::{BufferPair, Grid};

/// Errors that can end a run abnormally.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The run parameters are invalid.
    #[error("invalid parameters: {source}")]
    Params {
        /// The underlying parameter error.
        #[from]
        source: ParamsError,
    },

    /// The initial grid does not match the parameters.
    #[error("grid is {found:?}, parameters say {expected:?}")]
    GridMismatch {
        /// `(width, height)` from the parameters.
        expected: (usize, usize),
        /// `(width, height)` of the grid.
        found: (usize, usize),
    },

    /// The worker pool could not be started.
    #[error("worker pool failed to start: {source}")]
    Pool {
        /// The underlying pool builder error.
        #[from]
        source: ThreadPoolBuildError,
    },

    /// A turn could not be computed. Fatal: no partial turn is committed.
    #[error("evolve error: {source}")]
    Evolve {
        /// The underlying evolver error.
        #[from]
        source: EvolveError,
    },

    /// The turn counter would overflow.
    #[error("turn counter overflow")]
    TurnOverflow,

    /// The blocking task running the scheduler was cancelled or panicked.
    #[error("run task aborted: {message}")]
    Aborted {
        /// Description of the failure.
        message: String,
    },
}

/// Why a run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// All requested turns were computed.
    Completed,
    /// A `Quit` command was received.
    Quit,
    /// A `Kill` command was received.
    Killed,
    /// Every handle was dropped while paused, so nobody could resume.
    Abandoned,
}

/// The result of a terminated run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The run's identifier.
    pub id: RunId,
    /// The grid at the final turn.
    pub grid: Grid,
    /// Number of completed turns.
    pub turn: u64,
    /// Why the run ended.
    pub end_reason: EndReason,
}

impl RunOutcome {
    /// Every live cell of the final grid.
    pub fn alive_cells(&self) -> Vec<Coord> {
        self.grid.alive_cells()
    }
}

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Running,
    Paused,
    Terminated(EndReason),
}

/// Owns the run state and drives the turn loop.
pub struct Scheduler {
    id: RunId,
    params: Params,
    buffers: BufferPair,
    pool: ThreadPool,
    turn: u64,
    phase: RunPhase,
    inbox: Inbox,
    sink: Arc<dyn EventSink>,
}

impl Scheduler {
    /// Prepare a run of `grid` under `params`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Params`] for invalid parameters,
    /// [`SchedulerError::GridMismatch`] if the grid's dimensions differ
    /// from the parameters, and [`SchedulerError::Pool`] if the worker
    /// threads cannot be started.
    pub fn new(
        id: RunId,
        grid: Grid,
        params: Params,
        inbox: Inbox,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, SchedulerError> {
        let params = params.validated()?;
        let found = (grid.width(), grid.height());
        if found != (params.width, params.height) {
            return Err(SchedulerError::GridMismatch {
                expected: (params.width, params.height),
                found,
            });
        }
        let pool = evolver::worker_pool(params.workers)?;
        Ok(Self {
            id,
            params,
            buffers: BufferPair::new(grid),
            pool,
            turn: 0,
            phase: RunPhase::Running,
            inbox,
            sink,
        })
    }

    /// Run until the turn limit or a terminating command.
    ///
    /// Blocks the calling thread; use [`launch`] from async code.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Evolve`] if a turn fails. The inbox is
    /// closed in every case, so waiting callers are released.
    pub fn run(mut self) -> Result<RunOutcome, SchedulerError> {
        info!(
            run_id = %self.id,
            width = self.params.width,
            height = self.params.height,
            turns = self.params.turns,
            workers = self.params.workers,
            "Run started"
        );

        self.announce_initial_cells();
        self.emit_phase(Phase::Executing);

        let result = self.drive();
        let dropped = self.inbox.close();
        if dropped > 0 {
            debug!(run_id = %self.id, dropped, "Dropped requests queued at termination");
        }

        let end_reason = match result {
            Ok(reason) => reason,
            Err(e) => {
                warn!(run_id = %self.id, turn = self.turn, error = %e, "Run failed");
                return Err(e);
            }
        };

        let grid = self.buffers.into_current();
        self.sink.emit(Event::FinalTurnComplete {
            turn: self.turn,
            alive: grid.alive_cells(),
        });
        info!(run_id = %self.id, turn = self.turn, reason = ?end_reason, "Run ended");

        Ok(RunOutcome {
            id: self.id,
            grid,
            turn: self.turn,
            end_reason,
        })
    }

    /// The turn loop proper.
    fn drive(&mut self) -> Result<EndReason, SchedulerError> {
        // Turn 0 is a boundary too: a query sent right after launch sees
        // the complete initial grid.
        self.poll();

        loop {
            match self.phase {
                RunPhase::Terminated(reason) => return Ok(reason),
                RunPhase::Paused => match self.inbox.wait_next() {
                    Some(request) => self.service(request),
                    None => {
                        warn!(run_id = %self.id, turn = self.turn, "All handles dropped while paused");
                        self.phase = RunPhase::Terminated(EndReason::Abandoned);
                    }
                },
                RunPhase::Running => {
                    if self.turn >= self.params.turns {
                        return Ok(EndReason::Completed);
                    }
                    self.advance()?;
                    self.poll();
                }
            }
        }
    }

    /// Compute one turn and make it current.
    fn advance(&mut self) -> Result<(), SchedulerError> {
        let turn = self
            .turn
            .checked_add(1)
            .ok_or(SchedulerError::TurnOverflow)?;

        let (current, next) = self.buffers.split();
        let workers = self.params.workers;
        let sink = self.sink.as_ref();
        let summary = self
            .pool
            .install(|| evolver::step(current, next, workers, turn, sink))?;

        self.buffers.swap();
        self.turn = turn;
        self.sink.emit(Event::TurnComplete { turn });
        debug!(turn, flipped = summary.flipped, "Turn complete");
        Ok(())
    }

    /// Service at most one pending request without blocking.
    fn poll(&mut self) {
        if let Some(request) = self.inbox.try_next() {
            self.service(request);
        }
    }

    /// Answer one request. Only commands change state.
    fn service(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::AliveCount { reply } => {
                answer(
                    reply,
                    GameState {
                        alive_count: self.buffers.current().alive_count(),
                        turn: self.turn,
                    },
                );
            }
            ControlRequest::Snapshot { reply } => answer(reply, self.snapshot()),
            ControlRequest::Command { command, reply } => {
                let response = self.apply(command);
                answer(reply, response);
            }
        }
    }

    /// Apply a command to the state machine.
    fn apply(&mut self, command: Command) -> CommandReply {
        let mut snapshot = None;
        match command {
            Command::Save => snapshot = Some(self.snapshot()),
            Command::Pause => match self.phase {
                RunPhase::Running => {
                    self.phase = RunPhase::Paused;
                    info!(run_id = %self.id, turn = self.turn, "Run paused");
                    self.emit_phase(Phase::Paused);
                }
                RunPhase::Paused => {
                    self.phase = RunPhase::Running;
                    info!(run_id = %self.id, turn = self.turn, "Run resumed");
                    self.emit_phase(Phase::Executing);
                }
                RunPhase::Terminated(_) => {}
            },
            Command::Quit => {
                info!(run_id = %self.id, turn = self.turn, "Quit requested");
                self.phase = RunPhase::Terminated(EndReason::Quit);
            }
            Command::Kill => {
                info!(run_id = %self.id, turn = self.turn, "Kill requested");
                self.phase = RunPhase::Terminated(EndReason::Killed);
            }
        }

        CommandReply {
            command,
            turn: self.turn,
            paused: self.phase == RunPhase::Paused,
            snapshot,
        }
    }

    fn snapshot(&self) -> WorldState {
        WorldState {
            grid: self.buffers.current().clone(),
            turn: self.turn,
        }
    }

    fn emit_phase(&self, phase: Phase) {
        self.sink.emit(Event::StateChange {
            turn: self.turn,
            phase,
        });
    }

    /// Report the initially live cells as turn-0 flips, so a consumer
    /// that tracks the board from flips starts from the right picture.
    fn announce_initial_cells(&self) {
        if !self.sink.wants_cell_flips() {
            return;
        }
        for cell in self.buffers.current().alive_cells() {
            self.sink.emit(Event::CellFlipped { turn: 0, cell });
        }
    }
}

/// Send a reply; a caller that already gave up is not an error.
fn answer<T>(reply: tokio::sync::oneshot::Sender<T>, value: T) {
    if reply.send(value).is_err() {
        debug!("Requester gave up before the reply");
    }
}

// ---------------------------------------------------------------------------
// Launching
// ---------------------------------------------------------------------------

/// A run executing on a blocking task.
#[derive(Debug)]
pub struct ActiveRun {
    handle: RunHandle,
    task: JoinHandle<Result<RunOutcome, SchedulerError>>,
}

impl ActiveRun {
    /// The handle used to query and command this run.
    pub const fn handle(&self) -> &RunHandle {
        &self.handle
    }

    /// Wait for the run to terminate.
    ///
    /// # Errors
    ///
    /// Returns the scheduler's error, or [`SchedulerError::Aborted`] if the
    /// task panicked or was cancelled.
    pub async fn finish(self) -> Result<RunOutcome, SchedulerError> {
        self.task.await.map_err(|e| SchedulerError::Aborted {
            message: e.to_string(),
        })?
    }
}

/// Start a run of `grid` under `params` on a blocking task.
///
/// The turn kernel is CPU-bound and the paused state blocks on the inbox,
/// so the scheduler never runs on an async worker thread.
///
/// # Errors
///
/// Fails before anything is spawned if the parameters or the grid are
/// invalid.
pub fn launch(
    grid: Grid,
    params: Params,
    engine: &EngineConfig,
    sink: Arc<dyn EventSink>,
) -> Result<ActiveRun, SchedulerError> {
    let (handle, inbox) = RunHandle::channel(engine.inbox_capacity, engine.query_timeout());
    let scheduler = Scheduler::new(handle.id(), grid, params, inbox, sink)?;
    let task = tokio::task::spawn_blocking(move || scheduler.run());
    Ok(ActiveRun { handle, task })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::control::ControlError;
    use crate::events::NullSink;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn engine() -> EngineConfig {
        EngineConfig {
            query_timeout_ms: 5000,
            ..EngineConfig::default()
        }
    }

    fn params(width: usize, height: usize, turns: u64, workers: usize) -> Params {
        Params {
            width,
            height,
            turns,
            workers,
        }
    }

    fn blinker() -> Grid {
        Grid::with_alive(5, 5, [Coord::new(1, 2), Coord::new(2, 2), Coord::new(3, 2)]).unwrap()
    }

    #[tokio::test]
    async fn completes_all_turns() {
        let run = launch(blinker(), params(5, 5, 4, 2), &engine(), Arc::new(NullSink)).unwrap();
        let outcome = run.finish().await.unwrap();
        assert_eq!(outcome.turn, 4);
        assert_eq!(outcome.end_reason, EndReason::Completed);
        assert_eq!(outcome.grid, blinker());
    }

    #[tokio::test]
    async fn zero_turns_returns_initial_grid() {
        let run = launch(blinker(), params(5, 5, 0, 1), &engine(), Arc::new(NullSink)).unwrap();
        let outcome = run.finish().await.unwrap();
        assert_eq!(outcome.turn, 0);
        assert_eq!(outcome.grid, blinker());
    }

    #[tokio::test]
    async fn mismatched_grid_is_rejected() {
        let result = launch(blinker(), params(6, 5, 1, 1), &engine(), Arc::new(NullSink));
        assert!(matches!(result, Err(SchedulerError::GridMismatch { .. })));
    }

    #[tokio::test]
    async fn zero_workers_rejected() {
        let result = launch(blinker(), params(5, 5, 1, 0), &engine(), Arc::new(NullSink));
        assert!(matches!(result, Err(SchedulerError::Params { .. })));
    }

    #[tokio::test]
    async fn event_stream_is_well_formed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let run = launch(blinker(), params(5, 5, 3, 2), &engine(), Arc::new(tx)).unwrap();
        run.finish().await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        let initial_flips = events
            .iter()
            .filter(|e| matches!(e, Event::CellFlipped { turn: 0, .. }))
            .count();
        assert_eq!(initial_flips, 3);

        let turns: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                Event::TurnComplete { turn } => Some(*turn),
                _ => None,
            })
            .collect();
        assert_eq!(turns, vec![1, 2, 3]);

        // Each blinker turn flips exactly four cells.
        for turn in 1..=3 {
            let flips = events
                .iter()
                .filter(|e| matches!(e, Event::CellFlipped { turn: t, .. } if *t == turn))
                .count();
            assert_eq!(flips, 4, "turn {turn}");
        }

        assert!(matches!(
            events.first(),
            Some(Event::CellFlipped { turn: 0, .. })
        ));
        match events.last() {
            Some(Event::FinalTurnComplete { turn, alive }) => {
                assert_eq!(*turn, 3);
                assert_eq!(alive.len(), 3);
            }
            other => panic!("expected FinalTurnComplete, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn quit_stops_at_next_boundary() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let run = launch(
            blinker(),
            params(5, 5, u64::MAX, 2),
            &engine(),
            Arc::new(tx),
        )
        .unwrap();

        let reply = run.handle().command(Command::Quit).await.unwrap();
        let handle = run.handle().clone();
        let outcome = run.finish().await.unwrap();

        assert_eq!(outcome.end_reason, EndReason::Quit);
        assert_eq!(outcome.turn, reply.turn);

        let mut last_turn_complete = 0;
        while let Ok(event) = rx.try_recv() {
            if let Event::TurnComplete { turn } = event {
                last_turn_complete = turn;
            }
        }
        assert_eq!(last_turn_complete, reply.turn);

        // The inbox is closed once the run has terminated.
        assert_eq!(
            handle.alive_cells_count().await,
            Err(ControlError::NoActiveRun)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn kill_ends_with_killed() {
        let run = launch(
            blinker(),
            params(5, 5, u64::MAX, 1),
            &engine(),
            Arc::new(NullSink),
        )
        .unwrap();
        run.handle().command(Command::Kill).await.unwrap();
        assert_eq!(run.finish().await.unwrap().end_reason, EndReason::Killed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn paused_run_answers_frozen_state() {
        let run = launch(
            blinker(),
            params(5, 5, u64::MAX, 2),
            &engine(),
            Arc::new(NullSink),
        )
        .unwrap();
        let handle = run.handle().clone();

        let paused = handle.command(Command::Pause).await.unwrap();
        assert!(paused.paused);

        let first = handle.alive_cells_count().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = handle.alive_cells_count().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.turn, paused.turn);
        assert_eq!(first.alive_count, 3);

        let saved = handle.command(Command::Save).await.unwrap();
        let snapshot = saved.snapshot.unwrap();
        assert_eq!(snapshot.turn, paused.turn);
        assert!(saved.paused);

        let resumed = handle.command(Command::Pause).await.unwrap();
        assert!(!resumed.paused);
        assert_eq!(resumed.turn, paused.turn);

        // Turns advance again after resuming.
        let later = loop {
            let state = handle.alive_cells_count().await.unwrap();
            if state.turn > paused.turn {
                break state;
            }
        };
        assert!(later.turn > paused.turn);

        handle.command(Command::Quit).await.unwrap();
        assert_eq!(run.finish().await.unwrap().end_reason, EndReason::Quit);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn quit_while_paused_terminates() {
        let run = launch(
            blinker(),
            params(5, 5, u64::MAX, 1),
            &engine(),
            Arc::new(NullSink),
        )
        .unwrap();
        let paused = run.handle().command(Command::Pause).await.unwrap();
        let quit = run.handle().command(Command::Quit).await.unwrap();
        assert_eq!(quit.turn, paused.turn);

        let outcome = run.finish().await.unwrap();
        assert_eq!(outcome.end_reason, EndReason::Quit);
        assert_eq!(outcome.turn, paused.turn);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn query_right_after_launch_sees_whole_grid() {
        let grid = blinker();
        let run = launch(grid.clone(), params(5, 5, 2, 1), &engine(), Arc::new(NullSink)).unwrap();
        match run.handle().world_state().await {
            Ok(state) => {
                // Any answer is a complete turn: the blinker always has 3 cells.
                assert_eq!(state.grid.alive_count(), 3);
                assert!(state.turn <= 2);
            }
            Err(e) => assert_eq!(e, ControlError::NoActiveRun),
        }
        run.finish().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_pause_terminates() {
        let (handle, inbox) = RunHandle::channel(4, Duration::from_secs(5));
        let scheduler = Scheduler::new(
            handle.id(),
            blinker(),
            params(5, 5, u64::MAX, 1),
            inbox,
            Arc::new(NullSink),
        )
        .unwrap();
        let task = tokio::task::spawn_blocking(move || scheduler.run());

        // Pause, then drop the only handle so nobody can resume.
        let paused = handle.command(Command::Pause).await.unwrap();
        drop(handle);

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.end_reason, EndReason::Abandoned);
        assert_eq!(outcome.turn, paused.turn);
    }
}

//! Shared application state for the gateway.
//!
//! [`GatewayState`] holds the [`RunHandle`] of the single run the gateway
//! is serving, if any. It is injected into every handler through Axum's
//! `State` extractor; nothing about the active run lives in a global.

use gol_core::config::EngineConfig;
use gol_core::control::RunHandle;
use gol_types::RunId;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{watch, RwLock};
use tracing::info;

use crate::error::GatewayError;

/// Shared state for all gateway handlers.
#[derive(Debug)]
pub struct GatewayState {
    /// Engine settings applied to every run started through the gateway.
    pub engine: EngineConfig,
    /// Handle of the run currently being served.
    active: RwLock<Option<RunHandle>>,
    /// Cleared by `kill`; no `start` is accepted afterwards.
    accepting: AtomicBool,
    /// Flipped to `true` when the server should shut down.
    shutdown: watch::Sender<bool>,
}

impl GatewayState {
    /// Create gateway state with no active run.
    pub fn new(engine: EngineConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            engine,
            active: RwLock::new(None),
            accepting: AtomicBool::new(true),
            shutdown,
        }
    }

    /// The handle of the active run, if one is still in flight.
    pub async fn active(&self) -> Option<RunHandle> {
        self.active
            .read()
            .await
            .as_ref()
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// The handle of the active run.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NoActiveRun`] if no run is in flight.
    pub async fn require_active(&self) -> Result<RunHandle, GatewayError> {
        self.active().await.ok_or(GatewayError::NoActiveRun)
    }

    /// Reserve the run slot for `launch`, which is called with the slot
    /// locked so two concurrent starts cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ShuttingDown`] after `kill`, or
    /// [`GatewayError::RunInProgress`] if a run is in flight.
    pub async fn begin_run<T>(
        &self,
        launch: impl FnOnce() -> Result<(RunHandle, T), GatewayError>,
    ) -> Result<(RunHandle, T), GatewayError> {
        if !self.is_accepting() {
            return Err(GatewayError::ShuttingDown);
        }
        let mut slot = self.active.write().await;
        if let Some(current) = slot.as_ref().filter(|handle| !handle.is_closed()) {
            return Err(GatewayError::RunInProgress(current.id()));
        }
        let (handle, extra) = launch()?;
        *slot = Some(handle.clone());
        drop(slot);
        Ok((handle, extra))
    }

    /// Release the run slot if it still holds run `id`.
    pub async fn end_run(&self, id: RunId) {
        let mut slot = self.active.write().await;
        if slot.as_ref().is_some_and(|handle| handle.id() == id) {
            *slot = None;
        }
    }

    /// Whether new runs are accepted.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Stop accepting runs and signal the server to shut down.
    pub fn shut_down(&self) {
        if self.accepting.swap(false, Ordering::AcqRel) {
            info!("Gateway shutting down");
        }
        self.shutdown.send_replace(true);
    }

    /// Resolve once [`shut_down`](Self::shut_down) has been called.
    pub async fn shutdown_requested(&self) {
        let mut rx = self.shutdown.subscribe();
        // The sender lives in `self`, so the channel cannot close first.
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

impl Default for GatewayState {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_run_is_rejected_while_first_is_open() {
        let state = GatewayState::default();
        let (first, _inbox) = state
            .begin_run(|| {
                let (handle, inbox) = RunHandle::channel(1, Duration::from_secs(1));
                Ok((handle, inbox))
            })
            .await
            .unwrap();

        let second = state
            .begin_run(|| Ok(RunHandle::channel(1, Duration::from_secs(1))))
            .await;
        assert!(matches!(second, Err(GatewayError::RunInProgress(id)) if id == first.id()));

        state.end_run(first.id()).await;
        assert!(state.active().await.is_none());
    }

    #[tokio::test]
    async fn closed_run_frees_the_slot() {
        let state = GatewayState::default();
        let (_, mut inbox) = state
            .begin_run(|| Ok(RunHandle::channel(1, Duration::from_secs(1))))
            .await
            .unwrap();
        inbox.close();
        assert!(state.active().await.is_none());
        assert!(matches!(
            state.require_active().await,
            Err(GatewayError::NoActiveRun)
        ));
    }

    #[tokio::test]
    async fn shut_down_rejects_new_runs() {
        let state = GatewayState::default();
        state.shut_down();
        state.shutdown_requested().await;
        assert!(!state.is_accepting());
        let result = state
            .begin_run(|| Ok(RunHandle::channel(1, Duration::from_secs(1))))
            .await;
        assert!(matches!(result, Err(GatewayError::ShuttingDown)));
    }
}

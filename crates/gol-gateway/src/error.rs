//! Error types for the remote gateway.
//!
//! [`GatewayError`] unifies every way a call can fail into a single enum
//! that converts into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. The body
//! is always an [`ErrorBody`] carrying a machine-readable `kind`, which
//! the client maps back into a typed error.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gol_core::control::ControlError;
use gol_core::grid::GridError;
use gol_core::scheduler::SchedulerError;
use gol_types::{ErrorBody, InvalidCommand, RunId};

/// Errors that can occur in the gateway API layer.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No run is in flight.
    #[error("no active run")]
    NoActiveRun,

    /// A run is already in flight; only one run at a time is served.
    #[error("run {0} is already in progress")]
    RunInProgress(RunId),

    /// The `command` field is not a known command.
    #[error(transparent)]
    InvalidCommand(#[from] InvalidCommand),

    /// The request body is malformed or describes an invalid grid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The gateway received `kill` and accepts no new runs.
    #[error("gateway is shutting down")]
    ShuttingDown,

    /// The run did not answer within the bounded wait.
    #[error("run did not answer within {waited_ms}ms")]
    Timeout {
        /// How long the gateway waited.
        waited_ms: u64,
    },

    /// A pause is already in flight.
    #[error("a pause request is already pending")]
    PauseAlreadyPending,

    /// The run failed while computing.
    #[error("run failed: {0}")]
    RunFailed(String),
}

impl GatewayError {
    /// Machine-readable kind carried in the error body.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NoActiveRun => "no_active_run",
            Self::RunInProgress(_) => "run_in_progress",
            Self::InvalidCommand(_) => "invalid_command",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ShuttingDown => "shutting_down",
            Self::Timeout { .. } => "timeout",
            Self::PauseAlreadyPending => "pause_already_pending",
            Self::RunFailed(_) => "run_failed",
        }
    }

    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NoActiveRun | Self::RunInProgress(_) | Self::PauseAlreadyPending => {
                StatusCode::CONFLICT
            }
            Self::InvalidCommand(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::RunFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ControlError> for GatewayError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::NoActiveRun => Self::NoActiveRun,
            ControlError::Timeout { waited_ms } => Self::Timeout { waited_ms },
            ControlError::PauseAlreadyPending => Self::PauseAlreadyPending,
        }
    }
}

impl From<SchedulerError> for GatewayError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Params { .. } | SchedulerError::GridMismatch { .. } => {
                Self::InvalidRequest(err.to_string())
            }
            other => Self::RunFailed(other.to_string()),
        }
    }
}

impl From<GridError> for GatewayError {
    fn from(err: GridError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind().to_owned(),
            status: status.as_u16(),
        };
        (status, axum::Json(body)).into_response()
    }
}

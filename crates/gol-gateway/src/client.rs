//! Caller side of the remote protocol.
//!
//! [`RemoteClient`] talks to a gateway over HTTP with `reqwest`. The
//! underlying connection pool is created lazily on the first call and
//! reused for every later call from the same client, so a controller
//! process holds exactly one.
//!
//! `start` has no request timeout (it returns only when the remote run
//! terminates); every other call is bounded by the configured timeout.

use std::time::Duration;

use gol_core::config::ClientConfig;
use gol_core::grid::{Grid, GridError};
use gol_core::ticker::{AliveCountSource, SampleError};
use gol_types::{
    AliveCellsCountRequest, AliveCellsCountResponse, Command, Coord, ErrorBody, GameState,
    HealthResponse, Params, StartRequest, StartResponse, StateRequest, StateResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::debug;

/// Errors returned by [`RemoteClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The gateway could not be reached, or the connection broke mid-call.
    /// Not retried.
    #[error("connection to {url} failed: {message}")]
    ConnectionFailure {
        /// The URL that was called.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// The gateway answered with an error body.
    #[error("gateway returned {status} ({kind}): {message}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Machine-readable error kind, e.g. `no_active_run`.
        kind: String,
        /// Human-readable description.
        message: String,
    },

    /// The gateway's answer could not be decoded.
    #[error("could not decode response from {url}: {message}")]
    Decode {
        /// The URL that was called.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// The gateway returned a grid that is not a valid grid.
    #[error("gateway returned an invalid grid: {0}")]
    InvalidGrid(#[from] GridError),
}

impl ClientError {
    /// Whether the gateway reported that no run is in flight.
    pub fn is_no_active_run(&self) -> bool {
        matches!(self, Self::Remote { kind, .. } if kind == "no_active_run")
    }
}

/// Final state of a remote run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutcome {
    /// The grid at the final turn.
    pub grid: Grid,
    /// Number of completed turns.
    pub turn: u64,
    /// Every live cell of the final grid.
    pub alive: Vec<Coord>,
}

/// HTTP client for a remote gateway.
#[derive(Debug)]
pub struct RemoteClient {
    base_url: String,
    timeout: Duration,
    http: OnceCell<reqwest::Client>,
}

impl RemoteClient {
    /// Create a client for the gateway at `config.server_url`. No
    /// connection is made until the first call.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            base_url: config.server_url.trim_end_matches('/').to_owned(),
            timeout: config.request_timeout(),
            http: OnceCell::new(),
        }
    }

    /// The gateway's base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run `grid` remotely and wait for the run to terminate.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectionFailure`] if the gateway cannot be
    /// reached or the connection drops, and [`ClientError::Remote`] if the
    /// gateway rejects the run.
    pub async fn start(&self, params: &Params, grid: &Grid) -> Result<RemoteOutcome, ClientError> {
        let request = StartRequest::new(params, grid.to_rows());
        let response: StartResponse = self.post("/rpc/start", &request, None).await?;
        Ok(RemoteOutcome {
            grid: Grid::from_rows(&response.updated_grid)?,
            turn: response.turns,
            alive: response.alive,
        })
    }

    /// Alive-cell count of the remote run.
    pub async fn alive_cells_count(&self) -> Result<GameState, ClientError> {
        let response: AliveCellsCountResponse = self
            .post(
                "/rpc/alive-cells-count",
                &AliveCellsCountRequest {},
                Some(self.timeout),
            )
            .await?;
        Ok(GameState {
            alive_count: response.cells_alive,
            turn: response.turns,
        })
    }

    /// Apply `command` to the remote run.
    pub async fn state(&self, command: Command) -> Result<StateResponse, ClientError> {
        let request = StateRequest {
            command: command.as_str().to_owned(),
        };
        self.post("/rpc/state", &request, Some(self.timeout)).await
    }

    /// Gateway status.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .http()
            .await?
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| connection_failure(&url, &e))?;
        decode(&url, response).await
    }

    async fn http(&self) -> Result<&reqwest::Client, ClientError> {
        self.http
            .get_or_try_init(|| async {
                debug!(url = %self.base_url, "Creating gateway connection pool");
                reqwest::Client::builder()
                    .build()
                    .map_err(|e| connection_failure(&self.base_url, &e))
            })
            .await
    }

    async fn post<Req, Resp>(
        &self,
        path: &str,
        body: &Req,
        timeout: Option<Duration>,
    ) -> Result<Resp, ClientError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.http().await?.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| connection_failure(&url, &e))?;
        decode(&url, response).await
    }
}

/// Remote samples never report [`SampleError::Finished`]: before the
/// gateway registers the run it answers `no_active_run` too, so the caller
/// that owns the `start` call decides when sampling ends.
impl AliveCountSource for RemoteClient {
    async fn sample(&self) -> Result<GameState, SampleError> {
        self.alive_cells_count()
            .await
            .map_err(|e| SampleError::Transient {
                message: e.to_string(),
            })
    }
}

fn connection_failure(url: &str, err: &reqwest::Error) -> ClientError {
    ClientError::ConnectionFailure {
        url: url.to_owned(),
        message: err.to_string(),
    }
}

/// Turn a response into `T`, or into [`ClientError::Remote`] if the
/// gateway answered with an error status.
async fn decode<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(|e| ClientError::Decode {
            url: url.to_owned(),
            message: e.to_string(),
        });
    }

    let text = response
        .text()
        .await
        .map_err(|e| connection_failure(url, &e))?;
    Err(serde_json::from_str::<ErrorBody>(&text).map_or_else(
        |_not_json| ClientError::Remote {
            status: status.as_u16(),
            kind: "unknown".to_owned(),
            message: text.clone(),
        },
        |body| ClientError::Remote {
            status: body.status,
            kind: body.kind,
            message: body.error,
        },
    ))
}

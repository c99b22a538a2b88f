//! Gateway HTTP server lifecycle management.
//!
//! [`start_server`] binds the configured address and serves until the
//! gateway is shut down, either by a `kill` command or by the owning
//! binary calling [`GatewayState::shut_down`]. Shutdown is graceful: calls
//! already in flight (including a long-lived `start`) are answered first.

use std::net::SocketAddr;
use std::sync::Arc;

use gol_core::config::ServerConfig;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::GatewayState;

/// Errors that can occur when starting or running the gateway server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

/// Start the gateway HTTP server on the configured address.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind or the server
/// encounters a fatal I/O error.
pub async fn start_server(
    config: &ServerConfig,
    state: Arc<GatewayState>,
) -> Result<(), ServerError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| ServerError::Bind(format!("invalid address: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    serve(listener, state).await
}

/// Serve the gateway on an already-bound listener until shutdown.
///
/// # Errors
///
/// Returns [`ServerError::Serve`] on a fatal I/O error.
pub async fn serve(listener: TcpListener, state: Arc<GatewayState>) -> Result<(), ServerError> {
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("listener has no address: {e}")))?;
    info!(%addr, "Gateway listening");

    let router = build_router(Arc::clone(&state));
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { state.shutdown_requested().await })
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))?;

    info!(%addr, "Gateway stopped");
    Ok(())
}

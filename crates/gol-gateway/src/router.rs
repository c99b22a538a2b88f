//! Axum router construction for the gateway.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::GatewayState;

/// Build the complete Axum router for the gateway.
///
/// The router includes:
/// - `POST /rpc/start` -- run a grid to completion
/// - `POST /rpc/alive-cells-count` -- sample the active run
/// - `POST /rpc/state` -- control the active run
/// - `GET /health` -- gateway status
pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/rpc/start", post(handlers::start))
        .route("/rpc/alive-cells-count", post(handlers::alive_cells_count))
        .route("/rpc/state", post(handlers::state_command))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

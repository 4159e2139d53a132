//! Health check endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::engine::EngineState;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    engine_healthy: bool,
    engine_state: EngineState,
    /// Gateway bind host.
    host: String,
    /// llama-server port.
    port: u16,
    default_model: String,
}

/// GET /health - gateway liveness plus a live health check of llama-server.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = state.config().await;
    let supervisor = state.supervisor().await;

    Json(HealthResponse {
        status: "ok",
        engine_healthy: supervisor.health().await,
        engine_state: supervisor.state().await,
        host: config.host,
        port: config.llama_server_port,
        default_model: config.default_model,
    })
}

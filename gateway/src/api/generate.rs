//! Prompt completion endpoint.

use std::sync::Arc;

use aurora_common::GenerateRequest;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use super::{log_failure, sse_response};
use crate::error::Result;
use crate::proxy::Reply;
use crate::state::AppState;

/// Build the generate router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/generate", post(generate))
}

/// POST /api/generate - complete a prompt, as JSON or as an SSE stream.
async fn generate(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload?;

    let reply = state
        .gateway()
        .await
        .generate(request)
        .await
        .inspect_err(|e| log_failure(&state.logs, e))?;

    Ok(match reply {
        Reply::Complete(response) => Json(response).into_response(),
        Reply::Stream(events) => sse_response(state.logs.clone(), events).into_response(),
    })
}

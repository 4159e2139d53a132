//! Chat endpoint.

use std::sync::Arc;

use aurora_common::ChatRequest;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use super::{log_failure, sse_response};
use crate::error::Result;
use crate::proxy::Reply;
use crate::state::AppState;

/// Build the chat router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(chat))
}

/// POST /api/chat - chat with a model, as JSON or as an SSE stream.
async fn chat(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload?;
    tracing::debug!("Chat request with {} message(s)", request.messages.len());

    let reply = state
        .gateway()
        .await
        .chat(request)
        .await
        .inspect_err(|e| log_failure(&state.logs, e))?;

    Ok(match reply {
        Reply::Complete(response) => Json(response).into_response(),
        Reply::Stream(events) => sse_response(state.logs.clone(), events).into_response(),
    })
}

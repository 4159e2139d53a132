//! HTTP API.

pub mod chat;
pub mod generate;
pub mod health;
pub mod logs;
pub mod models;
pub mod settings;

use std::sync::Arc;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Router;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tracing::Level;

use crate::error::Error;
use crate::logs::{emit, LogBuffer};
use crate::proxy::EventStream;
use crate::state::AppState;

/// Build the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(generate::router())
        .merge(chat::router())
        .merge(models::router())
        .merge(settings::router())
        .merge(logs::router())
}

/// Serve gateway events as SSE, one `data: <json>` frame per event.
///
/// A failed item is logged and then ends the response body, so the client sees the
/// stream close without a terminal event.
fn sse_response<T>(
    logs: Arc<LogBuffer>,
    events: EventStream<T>,
) -> Sse<impl Stream<Item = Result<Event, Error>>>
where
    T: Serialize + Send + 'static,
{
    let stream = events.map(move |item| {
        let result = item.and_then(|event| {
            Event::default()
                .json_data(event)
                .map_err(|e| Error::Internal(format!("failed to encode event: {}", e)))
        });
        if let Err(e) = &result {
            emit(logs.as_ref(), Level::ERROR, &format!("Stream aborted: {}", e));
        }
        result
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Record a failed request in the log buffer when it is the gateway's or the
/// engine's fault.
fn log_failure(logs: &LogBuffer, error: &Error) {
    if error.status().is_server_error() {
        emit(logs, Level::ERROR, &error.to_string());
    }
}

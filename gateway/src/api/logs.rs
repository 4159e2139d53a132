//! Log buffer endpoints.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};

use crate::logs::LogBuffer;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 200;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Build the logs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/logs", get(get_logs))
        .route("/logs/stream", get(stream_logs))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    lines: Vec<String>,
}

/// GET /api/logs?limit=N - the most recent log lines.
async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Json<LogsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    Json(LogsResponse {
        lines: state.logs.tail(limit),
    })
}

/// GET /api/logs/stream - the buffered lines, then new ones as they arrive.
async fn stream_logs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(follow(state.logs.clone(), POLL_INTERVAL)).keep_alive(KeepAlive::default())
}

/// Poll the buffer for entries newer than the last one sent. Ends only when the
/// client goes away and the stream is dropped.
fn follow(
    logs: Arc<LogBuffer>,
    interval: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(
        (logs, 0u64, VecDeque::new()),
        move |(logs, mut last_id, mut pending)| async move {
            loop {
                if let Some(line) = pending.pop_front() {
                    return Some((Ok(Event::default().data(line)), (logs, last_id, pending)));
                }
                let entries = logs.since(last_id);
                if entries.is_empty() {
                    tokio::time::sleep(interval).await;
                    continue;
                }
                for entry in entries {
                    last_id = entry.id;
                    pending.push_back(entry.line);
                }
            }
        },
    )
}

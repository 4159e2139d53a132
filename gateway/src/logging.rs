use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::Level;
use uuid::Uuid;

use crate::logs::LogSink;
use crate::state::AppState;

/// Middleware that logs HTTP requests at INFO level, to `tracing` and the log buffer.
///
/// Requests for the log endpoints themselves only go to `tracing`, so polling the
/// buffer does not fill it.
pub async fn request_logger(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let status = response.status();
    let duration = start.elapsed();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "HTTP request"
    );

    if !path.starts_with("/api/logs") {
        state.logs.append(
            Level::INFO,
            &format!(
                "{} {} {} {}ms",
                method,
                path,
                status.as_u16(),
                duration.as_millis()
            ),
        );
    }

    response
}

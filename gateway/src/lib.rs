//! Aurora gateway: supervises a local llama-server and proxies generate/chat
//! requests to it, re-framing the engine's stream as SSE events.

use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod logs;
pub mod models;
pub mod proxy;
pub mod state;

use state::AppState;

/// Build the HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api::router())
        .route("/health", get(api::health::health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            logging::request_logger,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

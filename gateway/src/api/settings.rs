//! Live settings endpoints.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::config::{Settings, SettingsUpdate};
use crate::error::Result;
use crate::state::AppState;

/// Build the settings router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/settings", get(get_settings).post(update_settings))
}

/// GET /api/settings
async fn get_settings(State(state): State<Arc<AppState>>) -> Json<Settings> {
    Json(state.config().await.settings())
}

/// POST /api/settings - partial update. Changing a llama-server launch parameter
/// stops the running engine; the next request starts it with the new parameters.
async fn update_settings(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SettingsUpdate>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(update) = payload?;
    let settings = state.apply_settings(update).await?;
    Ok(Json(json!({ "status": "ok", "settings": settings })))
}

//! Model catalogue endpoints.

use std::path::Path as FsPath;
use std::sync::Arc;

use aurora_common::{ModelList, PopularModel, PullRequest, PullResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::Level;

use crate::error::{Error, Result};
use crate::logs::emit;
use crate::models::{self, Downloader, ModelResolver};
use crate::state::AppState;

/// Build the models router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/models", get(list_models))
        .route("/popular-models", get(list_popular_models))
        .route("/models/:name", delete(delete_model))
        .route("/pull", post(pull_model))
}

/// GET /api/models - configured and downloaded models.
async fn list_models(State(state): State<Arc<AppState>>) -> Result<Json<ModelList>> {
    let config = state.config().await;
    let models = ModelResolver::from_config(&config).list()?;
    Ok(Json(ModelList { models }))
}

/// GET /api/popular-models - the curated download catalogue, empty when it is
/// missing or unreadable.
async fn list_popular_models(State(state): State<Arc<AppState>>) -> Json<Vec<PopularModel>> {
    let config = state.config().await;
    let path = FsPath::new(&config.popular_models_file);
    match models::load_popular(path) {
        Ok(models) => Json(models),
        Err(e) => {
            emit(
                state.logs.as_ref(),
                Level::ERROR,
                &format!("Failed to load {}: {}", path.display(), e),
            );
            Json(Vec::new())
        }
    }
}

/// DELETE /api/models/:name - remove a downloaded model and its files.
async fn delete_model(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let config = state.config().await;
    models::delete_model(&config, &name)?;
    emit(state.logs.as_ref(), Level::INFO, &format!("Removed model {}", name));
    Ok(Json(json!({ "status": "removed", "name": name })))
}

/// POST /api/pull - queue a download from the model hub.
async fn pull_model(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<PullRequest>, JsonRejection>,
) -> Result<Json<PullResponse>> {
    let Json(request) = payload?;
    if let Some(field) = request.missing_field() {
        return Err(Error::BadRequest(format!(
            "{} is required (name, repo_id, and filename must all be set)",
            field
        )));
    }

    let config = state.config().await;
    let downloader = Downloader::new(state.http_client.clone(), &config);
    let logs = state.logs.clone();
    let name = request.name.clone();

    tokio::spawn(async move {
        emit(
            logs.as_ref(),
            Level::INFO,
            &format!("Downloading {} from {}", request.filename, request.repo_id),
        );
        match downloader.pull(&request).await {
            Ok(path) => emit(
                logs.as_ref(),
                Level::INFO,
                &format!("Model {} saved at {}", request.name, path.display()),
            ),
            Err(e) => emit(
                logs.as_ref(),
                Level::ERROR,
                &format!("Download of {} failed: {}", request.name, e),
            ),
        }
    });

    Ok(Json(PullResponse {
        status: "queued".to_string(),
        name,
    }))
}

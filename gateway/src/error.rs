//! Error types for the gateway.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::models::RegistryError;

/// Error kinds surfaced by the gateway.
///
/// Resolution and readiness failures are reported before any proxying starts.
/// Failures after a stream has begun terminate that stream instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("llama-server binary not found: {0}")]
    BinaryNotFound(String),

    #[error("Engine not ready: {0}")]
    EngineNotReady(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable kind, used as `error.type` in response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BadRequest(_) => "bad_request",
            Error::ModelUnavailable(_) => "model_unavailable",
            Error::BinaryNotFound(_) => "binary_not_found",
            Error::EngineNotReady(_) => "engine_not_ready",
            Error::Upstream(_) => "upstream_failure",
            Error::Registry(_) => "registry_error",
            Error::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::ModelUnavailable(_) => StatusCode::NOT_FOUND,
            Error::BinaryNotFound(_) | Error::EngineNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::Registry(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string()
            }
        }));

        (self.status(), body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::ModelUnavailable("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::BinaryNotFound("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::EngineNotReady("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(Error::Upstream("x".into()).status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = Error::ModelUnavailable("Model 'glm' not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["type"], "model_unavailable");
        assert_eq!(
            body["error"]["message"],
            "Model unavailable: Model 'glm' not found"
        );
    }
}

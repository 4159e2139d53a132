//! Prompt completion types (`POST /api/generate`).

use serde::{Deserialize, Serialize};

use crate::options::InferenceOptions;

/// Prompt completion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateRequest {
    /// Model name; the gateway's default model is used when absent or empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<InferenceOptions>,
}

/// Non-streaming completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub model: String,
    pub response: String,
    pub done: bool,
}

impl GenerateResponse {
    pub fn new(model: String, response: String) -> Self {
        Self {
            model,
            response,
            done: true,
        }
    }
}

/// One SSE event of a streaming completion.
///
/// Content events carry `response` with `done: false`; the terminal event has no
/// `response` and `done: true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateEvent {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub done: bool,
}

impl GenerateEvent {
    pub fn chunk(model: &str, text: String) -> Self {
        Self {
            model: model.to_string(),
            response: Some(text),
            done: false,
        }
    }

    pub fn done(model: &str) -> Self {
        Self {
            model: model.to_string(),
            response: None,
            done: true,
        }
    }
}

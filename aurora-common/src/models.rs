//! Model listing and download types.

use serde::{Deserialize, Serialize};

/// Where a model name was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// The static name -> path table in the configuration.
    Config,
    /// The persisted registry of downloaded models.
    Registry,
}

/// A named model and where it lives on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub path: String,
    pub source: ModelSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Response of `GET /api/models`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<ModelEntry>,
}

/// One entry of the curated download catalogue (`GET /api/popular-models`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularModel {
    /// Hub repository id.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_quant: Option<String>,
    /// GGUF filename to pull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gguf: Option<String>,
}

/// Request to download a model from the hub (`POST /api/pull`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PullRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub repo_id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subfolder: Option<String>,
}

impl PullRequest {
    /// Name of the first required field that is missing, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.name.trim().is_empty() {
            Some("name")
        } else if self.repo_id.trim().is_empty() {
            Some("repo_id")
        } else if self.filename.trim().is_empty() {
            Some("filename")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    pub status: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_source_serialization() {
        assert_eq!(serde_json::to_string(&ModelSource::Config).unwrap(), "\"config\"");
        assert_eq!(serde_json::to_string(&ModelSource::Registry).unwrap(), "\"registry\"");
    }

    #[test]
    fn test_pull_request_missing_field() {
        let req: PullRequest =
            serde_json::from_str(r#"{"name": "qwen", "repo_id": "Qwen/Qwen3-GGUF"}"#).unwrap();
        assert_eq!(req.missing_field(), Some("filename"));

        let req = PullRequest {
            name: "qwen".to_string(),
            repo_id: "Qwen/Qwen3-GGUF".to_string(),
            filename: "qwen3-q4_k_m.gguf".to_string(),
            ..Default::default()
        };
        assert_eq!(req.missing_field(), None);
    }
}

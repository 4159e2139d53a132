//! JSON registry of downloaded models.
//!
//! The file is a single object, `{"models": [ {name, path, repo_id, filename, ...} ]}`.
//! It is read fresh on every lookup and rewritten whole on every change. The gateway
//! writes it; the command-line client reads it for `info`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to access registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid registry {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One registry record. Keys this crate does not know about are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    models: Vec<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    path: PathBuf,
}

impl ModelRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current registry contents. A missing file, or a document that is not a JSON
    /// object, reads as empty. Non-object entries are skipped.
    pub fn load(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        Ok(self
            .read_document()?
            .models
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    /// Exact-name lookup.
    pub fn find(&self, name: &str) -> Result<Option<RegistryEntry>, RegistryError> {
        Ok(self.load()?.into_iter().find(|e| e.name == name))
    }

    /// Replace the registry contents, keeping unrelated top-level keys.
    pub fn save(&self, entries: &[RegistryEntry]) -> Result<(), RegistryError> {
        let mut document = self.read_document()?;
        document.models = entries
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()
            .map_err(|source| self.json_error(source))?;
        self.write_document(&document)
    }

    /// Insert `entry`, replacing any entry with the same name.
    pub fn upsert(&self, entry: RegistryEntry) -> Result<(), RegistryError> {
        let mut entries = self.load()?;
        entries.retain(|e| e.name != entry.name);
        entries.push(entry);
        self.save(&entries)
    }

    /// Remove the entry named `name`. Returns the removed entry, if there was one.
    pub fn remove(&self, name: &str) -> Result<Option<RegistryEntry>, RegistryError> {
        let mut entries = self.load()?;
        let Some(pos) = entries.iter().position(|e| e.name == name) else {
            return Ok(None);
        };
        let removed = entries.remove(pos);
        entries.retain(|e| e.name != name);
        self.save(&entries)?;
        Ok(Some(removed))
    }

    fn read_document(&self) -> Result<RegistryDocument, RegistryError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RegistryDocument::default())
            }
            Err(source) => return Err(self.io_error(source)),
        };

        let value: Value = serde_json::from_str(&raw).map_err(|source| self.json_error(source))?;
        if !value.is_object() {
            tracing::warn!(
                "Registry {} is not a JSON object, treating as empty",
                self.path.display()
            );
            return Ok(RegistryDocument::default());
        }
        serde_json::from_value(value).map_err(|source| self.json_error(source))
    }

    fn write_document(&self, document: &RegistryDocument) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let json =
            serde_json::to_string_pretty(document).map_err(|source| self.json_error(source))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| self.io_error(source))?;
        std::fs::rename(&tmp, &self.path).map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> RegistryError {
        RegistryError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn json_error(&self, source: serde_json::Error) -> RegistryError {
        RegistryError::Json {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str, path: &str) -> RegistryEntry {
        RegistryEntry {
            name: name.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::new(dir.path().join("models.json"));
        assert!(registry.load().unwrap().is_empty());
        assert!(registry.find("glm").unwrap().is_none());
    }

    #[test]
    fn test_non_object_document_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(ModelRegistry::new(&path).load().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ModelRegistry::new(&path).load(),
            Err(RegistryError::Json { .. })
        ));
    }

    #[test]
    fn test_upsert_replaces_same_name() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::new(dir.path().join("nested").join("models.json"));

        registry.upsert(entry("qwen", "/a.gguf")).unwrap();
        registry.upsert(entry("llama", "/b.gguf")).unwrap();
        registry.upsert(entry("qwen", "/c.gguf")).unwrap();

        let entries = registry.load().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(registry.find("qwen").unwrap().unwrap().path, "/c.gguf");
    }

    #[test]
    fn test_remove_keeps_other_entries_and_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models.json");
        std::fs::write(
            &path,
            r#"{
                "version": 2,
                "models": [
                    {"name": "qwen", "path": "/a.gguf", "size": 42},
                    {"name": "llama", "path": "/b.gguf", "repo_id": "meta/llama", "pinned": true},
                    "garbage"
                ]
            }"#,
        )
        .unwrap();
        let registry = ModelRegistry::new(&path);

        let removed = registry.remove("qwen").unwrap().unwrap();
        assert_eq!(removed.extra.get("size"), Some(&Value::from(42)));
        assert!(registry.remove("qwen").unwrap().is_none());

        let entries = registry.load().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].repo_id.as_deref(), Some("meta/llama"));
        assert_eq!(entries[0].extra.get("pinned"), Some(&Value::Bool(true)));

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 2);
    }
}

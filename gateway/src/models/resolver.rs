//! Model name resolution.

use std::collections::{BTreeMap, HashSet};

use aurora_common::{ModelEntry, ModelRegistry, ModelSource};

use crate::config::Config;
use crate::error::{Error, Result};

/// Maps model names to files using two ordered sources: the static table from the
/// configuration, then the registry of downloaded models. First match wins.
#[derive(Debug, Clone)]
pub struct ModelResolver {
    static_models: BTreeMap<String, String>,
    registry: ModelRegistry,
}

impl ModelResolver {
    pub fn new(static_models: BTreeMap<String, String>, registry: ModelRegistry) -> Self {
        Self {
            static_models,
            registry,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.models.clone(), ModelRegistry::new(config.registry_path()))
    }

    /// Resolve `name` to a model entry. Reads the registry once; nothing is cached.
    pub fn resolve(&self, name: &str) -> Result<ModelEntry> {
        if name.trim().is_empty() {
            return Err(Error::BadRequest("Model name must not be empty".to_string()));
        }

        if let Some(path) = self.static_models.get(name) {
            return Ok(ModelEntry {
                name: name.to_string(),
                path: path.clone(),
                source: ModelSource::Config,
                repo_id: None,
                filename: None,
            });
        }

        self.registry
            .find(name)?
            .map(|entry| ModelEntry {
                name: entry.name,
                path: entry.path,
                source: ModelSource::Registry,
                repo_id: entry.repo_id,
                filename: entry.filename,
            })
            .ok_or_else(|| Error::ModelUnavailable(format!("Model '{}' not found", name)))
    }

    /// Every known model: static entries first, then registry entries that are
    /// named and not shadowed.
    pub fn list(&self) -> Result<Vec<ModelEntry>> {
        let mut seen = HashSet::new();
        let mut models = Vec::new();

        for (name, path) in &self.static_models {
            seen.insert(name.clone());
            models.push(ModelEntry {
                name: name.clone(),
                path: path.clone(),
                source: ModelSource::Config,
                repo_id: None,
                filename: None,
            });
        }

        for entry in self.registry.load()? {
            if entry.name.is_empty() || !seen.insert(entry.name.clone()) {
                continue;
            }
            models.push(ModelEntry {
                name: entry.name,
                path: entry.path,
                source: ModelSource::Registry,
                repo_id: entry.repo_id,
                filename: entry.filename,
            });
        }

        Ok(models)
    }

    pub fn is_static(&self, name: &str) -> bool {
        self.static_models.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RegistryEntry;
    use tempfile::TempDir;

    fn resolver(dir: &TempDir, static_models: &[(&str, &str)]) -> ModelResolver {
        ModelResolver::new(
            static_models
                .iter()
                .map(|(n, p)| (n.to_string(), p.to_string()))
                .collect(),
            ModelRegistry::new(dir.path().join("models.json")),
        )
    }

    fn register(resolver: &ModelResolver, name: &str, path: &str) {
        resolver
            .registry
            .upsert(RegistryEntry {
                name: name.to_string(),
                path: path.to_string(),
                repo_id: Some("org/repo".to_string()),
                ..Default::default()
            })
            .unwrap();
    }

    #[test]
    fn test_static_table_shadows_registry() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, &[("glm", "/static/glm.gguf")]);
        register(&resolver, "glm", "/registry/glm.gguf");

        let entry = resolver.resolve("glm").unwrap();
        assert_eq!(entry.path, "/static/glm.gguf");
        assert_eq!(entry.source, ModelSource::Config);
    }

    #[test]
    fn test_registry_lookup() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, &[]);
        register(&resolver, "qwen", "/registry/qwen.gguf");

        let entry = resolver.resolve("qwen").unwrap();
        assert_eq!(entry.path, "/registry/qwen.gguf");
        assert_eq!(entry.source, ModelSource::Registry);
        assert_eq!(entry.repo_id.as_deref(), Some("org/repo"));
    }

    #[test]
    fn test_registry_is_reread_on_every_resolve() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, &[]);
        assert!(matches!(
            resolver.resolve("qwen"),
            Err(Error::ModelUnavailable(_))
        ));

        register(&resolver, "qwen", "/registry/qwen.gguf");
        assert!(resolver.resolve("qwen").is_ok());
    }

    #[test]
    fn test_empty_name_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, &[]);
        assert!(matches!(resolver.resolve(""), Err(Error::BadRequest(_))));
        assert!(matches!(resolver.resolve("  "), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_list_merges_and_dedups() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, &[("glm", "/static/glm.gguf")]);
        register(&resolver, "glm", "/registry/glm.gguf");
        register(&resolver, "qwen", "/registry/qwen.gguf");
        register(&resolver, "", "/registry/nameless.gguf");

        let models = resolver.list().unwrap();
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["glm", "qwen"]);
        assert_eq!(models[0].source, ModelSource::Config);
        assert_eq!(models[1].source, ModelSource::Registry);
    }
}

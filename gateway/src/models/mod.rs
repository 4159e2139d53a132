//! Model catalogue: name resolution, the download registry, and hub downloads.

mod download;
mod popular;
mod resolver;

use std::path::Path;

pub use aurora_common::registry::{ModelRegistry, RegistryEntry, RegistryError};
pub use download::{split_parts, DownloadError, Downloader};
pub use popular::load_popular;
pub use resolver::ModelResolver;

use crate::config::Config;
use crate::error::{Error, Result};

/// Remove a downloaded model: its files (only when they live under the storage
/// root) and its registry entry. Models from the static table cannot be removed.
pub fn delete_model(config: &Config, name: &str) -> Result<()> {
    if config.models.contains_key(name) {
        return Err(Error::BadRequest(format!(
            "Model '{}' is defined in the configuration file; remove it there",
            name
        )));
    }

    let registry = ModelRegistry::new(config.registry_path());
    let entry = registry
        .find(name)?
        .ok_or_else(|| Error::ModelUnavailable(format!("Model '{}' not found", name)))?;

    if !entry.path.is_empty() {
        remove_model_files(Path::new(&config.storage_dir), Path::new(&entry.path), name);
    }

    registry.remove(name)?;
    tracing::info!("Removed model {}", name);
    Ok(())
}

fn remove_model_files(storage_dir: &Path, path: &Path, name: &str) {
    let (Ok(root), Ok(target)) = (storage_dir.canonicalize(), path.canonicalize()) else {
        tracing::warn!("Files for model {} not found at {}", name, path.display());
        return;
    };

    let result = if target.is_file() {
        if target.starts_with(&root) {
            std::fs::remove_file(&target)
        } else {
            tracing::warn!("Refusing to delete file outside storage_dir: {}", target.display());
            return;
        }
    } else if target.is_dir() {
        if target.starts_with(&root) && target != root {
            std::fs::remove_dir_all(&target)
        } else {
            tracing::warn!("Refusing to delete folder outside storage_dir: {}", target.display());
            return;
        }
    } else {
        return;
    };

    if let Err(e) = result {
        tracing::warn!("Failed to remove files for model {}: {}", name, e);
    }
}

//! Curated catalogue of models worth downloading.

use std::path::Path;

use aurora_common::PopularModel;
use config::{Config as ConfigLoader, ConfigError, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Catalogue {
    #[serde(default)]
    models: Vec<PopularModel>,
}

/// Read the catalogue at `path`. A missing file is an empty catalogue.
pub fn load_popular(path: &Path) -> Result<Vec<PopularModel>, ConfigError> {
    if !path.exists() {
        tracing::warn!("Popular models catalogue not found at {}", path.display());
        return Ok(Vec::new());
    }

    let catalogue: Catalogue = ConfigLoader::builder()
        .add_source(File::from(path).format(FileFormat::Yaml))
        .build()?
        .try_deserialize()?;
    Ok(catalogue.models)
}

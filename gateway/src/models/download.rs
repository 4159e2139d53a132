//! Model downloads from the hub.

use std::path::{Component, Path, PathBuf};

use aurora_common::{ModelRegistry, PullRequest, RegistryEntry, RegistryError};
use reqwest::Client;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("invalid {field}: {value}")]
    InvalidPath { field: &'static str, value: String },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("download of {url} incomplete: got {got} bytes, expected {expected}")]
    Incomplete { url: String, got: u64, expected: u64 },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Fetches model files into `storage_dir/<name>/` and records them in the registry.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    hub_url: String,
    storage_dir: PathBuf,
    registry: ModelRegistry,
}

impl Downloader {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            hub_url: config.hub_url.trim_end_matches('/').to_string(),
            storage_dir: PathBuf::from(&config.storage_dir),
            registry: ModelRegistry::new(config.registry_path()),
        }
    }

    /// Download every file of `request` and upsert its registry entry.
    ///
    /// Split archives (`<prefix>-00001-of-<N>.gguf`) fetch all N parts; the registry
    /// path points at the first one. Returns that path.
    pub async fn pull(&self, request: &PullRequest) -> Result<PathBuf, DownloadError> {
        check_relative("name", &request.name)?;
        check_relative("filename", &request.filename)?;
        if let Some(subfolder) = request.subfolder.as_deref().filter(|s| !s.is_empty()) {
            check_relative("subfolder", subfolder)?;
        }

        let local_dir = self.storage_dir.join(&request.name);
        let files =
            split_parts(&request.filename).unwrap_or_else(|| vec![request.filename.clone()]);

        tracing::info!(
            "Downloading {} ({} file(s)) from {}",
            request.filename,
            files.len(),
            request.repo_id
        );

        for file in &files {
            let url = self.file_url(request, file);
            let dest = local_dir.join(relative_path(request, file));
            self.fetch(&url, &dest).await?;
        }

        let path = local_dir.join(relative_path(request, &request.filename));
        self.registry.upsert(RegistryEntry {
            name: request.name.clone(),
            path: path.to_string_lossy().into_owned(),
            repo_id: Some(request.repo_id.clone()),
            filename: Some(request.filename.clone()),
            ..Default::default()
        })?;

        tracing::info!("Model {} saved at {}", request.name, path.display());
        Ok(path)
    }

    fn file_url(&self, request: &PullRequest, filename: &str) -> String {
        let revision = request
            .revision
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or("main");
        format!(
            "{}/{}/resolve/{}/{}",
            self.hub_url,
            request.repo_id,
            revision,
            relative_path(request, filename).to_string_lossy()
        )
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let io_err = |source| DownloadError::Io {
            path: dest.to_path_buf(),
            source,
        };

        if let Ok(metadata) = fs::metadata(dest).await {
            if metadata.len() > 0 {
                tracing::info!("{} already present, skipping", dest.display());
                return Ok(());
            }
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let http_err = |source| DownloadError::Http {
            url: url.to_string(),
            source,
        };
        let mut response = self.client.get(url).send().await.map_err(http_err)?;
        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }
        let expected = response.content_length();

        let mut part_name = dest.as_os_str().to_owned();
        part_name.push(".part");
        let part = PathBuf::from(part_name);

        let mut file = File::create(&part).await.map_err(io_err)?;
        let mut downloaded: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(http_err)? {
            file.write_all(&chunk).await.map_err(io_err)?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;
        drop(file);

        if let Some(expected) = expected.filter(|e| *e != downloaded) {
            let _ = fs::remove_file(&part).await;
            return Err(DownloadError::Incomplete {
                url: url.to_string(),
                got: downloaded,
                expected,
            });
        }

        fs::rename(&part, dest).await.map_err(io_err)?;
        tracing::debug!("Downloaded {} bytes to {}", downloaded, dest.display());
        Ok(())
    }
}

/// Path of `filename` relative to the model directory.
fn relative_path(request: &PullRequest, filename: &str) -> PathBuf {
    match request.subfolder.as_deref().filter(|s| !s.is_empty()) {
        Some(subfolder) => Path::new(subfolder.trim_matches('/')).join(filename),
        None => PathBuf::from(filename),
    }
}

fn check_relative(field: &'static str, value: &str) -> Result<(), DownloadError> {
    let path = Path::new(value);
    let ok = !value.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(())
    } else {
        Err(DownloadError::InvalidPath {
            field,
            value: value.to_string(),
        })
    }
}

/// All part names of a split archive, given the name of its first part.
///
/// `model-00001-of-00003.gguf` -> `model-00001-of-00003.gguf`, `model-00002-of-00003.gguf`,
/// `model-00003-of-00003.gguf`. Returns `None` for anything else.
pub fn split_parts(filename: &str) -> Option<Vec<String>> {
    let stem = filename.strip_suffix(".gguf")?;
    let (head, total) = stem.rsplit_once("-of-")?;
    let prefix = head.strip_suffix("-00001")?;
    if prefix.is_empty() || total.is_empty() || !total.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let total: u32 = total.parse().ok().filter(|t| *t > 0)?;

    Some(
        (1..=total)
            .map(|i| format!("{}-{:05}-of-{:05}.gguf", prefix, i, total))
            .collect(),
    )
}

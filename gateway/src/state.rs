//! Shared application state.

use std::sync::Arc;

use reqwest::Client;
use tokio::sync::RwLock;
use tracing::Level;

use crate::config::{Config, Settings, SettingsUpdate};
use crate::engine::{ProcessSupervisor, Supervisor};
use crate::error::{Error, Result};
use crate::logs::{self, LogBuffer};
use crate::models::ModelResolver;
use crate::proxy::InferenceGateway;

/// Shared application state passed to all handlers.
pub struct AppState {
    /// Live configuration; `/api/settings` edits it in place.
    config: RwLock<Config>,
    /// Replaced when llama-server launch parameters change.
    supervisor: RwLock<Arc<dyn Supervisor>>,
    pub logs: Arc<LogBuffer>,
    pub http_client: Client,
}

impl AppState {
    pub fn new(config: Config, logs: Arc<LogBuffer>) -> Self {
        let http_client = Client::new();
        let supervisor: Arc<dyn Supervisor> = Arc::new(ProcessSupervisor::new(
            config.engine_config(),
            http_client.clone(),
            logs.clone(),
        ));
        Self {
            config: RwLock::new(config),
            supervisor: RwLock::new(supervisor),
            logs,
            http_client,
        }
    }

    /// State with a caller-provided supervisor.
    pub fn with_supervisor(
        config: Config,
        supervisor: Arc<dyn Supervisor>,
        logs: Arc<LogBuffer>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            supervisor: RwLock::new(supervisor),
            logs,
            http_client: Client::new(),
        }
    }

    /// Snapshot of the current configuration.
    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    pub async fn supervisor(&self) -> Arc<dyn Supervisor> {
        self.supervisor.read().await.clone()
    }

    /// A gateway bound to the current configuration and supervisor.
    pub async fn gateway(&self) -> InferenceGateway {
        let config = self.config.read().await;
        InferenceGateway::new(
            self.http_client.clone(),
            self.supervisor().await,
            ModelResolver::from_config(&config),
            config.readiness(),
            config.default_model.clone(),
            self.logs.clone(),
        )
    }

    /// Apply a settings update, restart the engine if its launch parameters changed,
    /// and persist the result.
    ///
    /// The update is staged on a copy. Nothing changes unless the storage dir exists
    /// (or can be created) and the overlay file is written.
    pub async fn apply_settings(&self, update: SettingsUpdate) -> Result<Settings> {
        let mut config = self.config.write().await;
        let mut next = config.clone();
        let engine_changed = next.apply(update);

        std::fs::create_dir_all(&next.storage_dir).map_err(|e| {
            Error::Internal(format!(
                "failed to create storage dir {}: {}",
                next.storage_dir, e
            ))
        })?;
        next.save_settings()
            .map_err(|e| Error::Internal(format!("failed to save settings: {}", e)))?;

        if engine_changed {
            let mut supervisor = self.supervisor.write().await;
            supervisor.stop().await;
            let replacement: Arc<dyn Supervisor> = Arc::new(ProcessSupervisor::new(
                next.engine_config(),
                self.http_client.clone(),
                self.logs.clone(),
            ));
            *supervisor = replacement;
            logs::emit(
                self.logs.as_ref(),
                Level::INFO,
                &format!(
                    "llama-server settings changed, engine now at {}",
                    next.engine_config().base_url()
                ),
            );
        }

        *config = next;
        Ok(config.settings())
    }
}

//! Client-side view of the gateway configuration.
//!
//! Reads the same sources the gateway does so `aurora` talks to the gateway
//! started from the same directory without extra flags.

use std::env;
use std::path::{Path, PathBuf};

use config::{Config as ConfigLoader, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    #[serde(default = "default_registry_filename")]
    pub registry_filename: String,

    /// Gateway-only keys, kept so `info` shows the merged configuration.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    11435
}
fn default_storage_dir() -> String {
    "./models".to_string()
}
fn default_registry_filename() -> String {
    "models.json".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            storage_dir: default_storage_dir(),
            registry_filename: default_registry_filename(),
            rest: Map::new(),
        }
    }
}

impl CliConfig {
    /// Environment (AURORA__KEY) over the settings overlay (AURORA_SETTINGS) over
    /// the config file (AURORA_CONFIG) over defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config_file = env::var("AURORA_CONFIG").unwrap_or_else(|_| "config".to_string());
        let settings_file =
            env::var("AURORA_SETTINGS").unwrap_or_else(|_| "settings.json".to_string());
        Self::load_from(&config_file, &settings_file)
    }

    pub fn load_from(config_file: &str, settings_file: &str) -> Result<Self, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::with_name(config_file).required(false))
            .add_source(File::new(settings_file, FileFormat::Json).required(false))
            .add_source(
                Environment::with_prefix("AURORA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn registry_path(&self) -> PathBuf {
        Path::new(&self.storage_dir).join(&self.registry_filename)
    }
}

//! Configuration for the gateway.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::engine::{EngineConfig, ReadinessPolicy};

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP API binds to.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Root directory for downloaded models and the registry file.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    /// Model used when a request does not name one.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Static model name -> file path table. Shadows registry entries of the same name.
    #[serde(default)]
    pub models: BTreeMap<String, String>,
    #[serde(default = "default_registry_filename")]
    pub registry_filename: String,
    /// Path to the llama-server binary. Looked up on PATH when the path does not exist.
    #[serde(default = "default_llama_server_path")]
    pub llama_server_path: String,
    #[serde(default = "default_llama_server_host")]
    pub llama_server_host: String,
    #[serde(default = "default_llama_server_port")]
    pub llama_server_port: u16,
    /// Extra llama-server arguments, split shell-style.
    /// Example: `"--ctx-size 8192 --n-gpu-layers 99"`
    #[serde(default)]
    pub llama_server_args: String,
    /// Grace period between SIGTERM and SIGKILL when stopping llama-server.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
    /// Health checks made while waiting for a freshly started llama-server.
    #[serde(default = "default_health_check_attempts")]
    pub health_check_attempts: u32,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_ms: u64,
    /// Default tracing filter when RUST_LOG is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the model hub used by pulls.
    #[serde(default = "default_hub_url")]
    pub hub_url: String,
    /// JSON overlay written by the settings endpoint.
    #[serde(default = "default_settings_file")]
    pub settings_file: String,
    /// YAML catalogue served by `/api/popular-models`.
    #[serde(default = "default_popular_models_file")]
    pub popular_models_file: String,
}

/// Live-editable settings, as exposed by `/api/settings` and persisted to the overlay file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub host: String,
    pub storage_dir: String,
    pub llama_server_path: String,
    pub llama_server_host: String,
    pub llama_server_port: u16,
    pub llama_server_args: String,
    pub default_model: String,
}

/// Partial settings update. Empty strings and a zero port leave the current value alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub storage_dir: Option<String>,
    #[serde(default)]
    pub llama_server_path: Option<String>,
    #[serde(default)]
    pub llama_server_host: Option<String>,
    #[serde(default)]
    pub llama_server_port: Option<u16>,
    /// May be set to an empty string to clear the extra arguments.
    #[serde(default)]
    pub llama_server_args: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    11435
}
fn default_storage_dir() -> String {
    "./models".to_string()
}
fn default_model() -> String {
    "glm".to_string()
}
fn default_registry_filename() -> String {
    "models.json".to_string()
}
fn default_llama_server_path() -> String {
    "./llama-server".to_string()
}
fn default_llama_server_host() -> String {
    "127.0.0.1".to_string()
}
fn default_llama_server_port() -> u16 {
    11436
}
fn default_shutdown_timeout() -> u64 {
    10
}
fn default_health_check_attempts() -> u32 {
    30
}
fn default_health_check_interval() -> u64 {
    200
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_hub_url() -> String {
    "https://huggingface.co".to_string()
}
fn default_settings_file() -> String {
    "settings.json".to_string()
}
fn default_popular_models_file() -> String {
    "popular-models.yaml".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            storage_dir: default_storage_dir(),
            default_model: default_model(),
            models: BTreeMap::new(),
            registry_filename: default_registry_filename(),
            llama_server_path: default_llama_server_path(),
            llama_server_host: default_llama_server_host(),
            llama_server_port: default_llama_server_port(),
            llama_server_args: String::new(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            health_check_attempts: default_health_check_attempts(),
            health_check_interval_ms: default_health_check_interval(),
            log_level: default_log_level(),
            hub_url: default_hub_url(),
            settings_file: default_settings_file(),
            popular_models_file: default_popular_models_file(),
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (AURORA__KEY format)
    /// 2. Settings overlay written by `/api/settings` (AURORA_SETTINGS, default settings.json)
    /// 3. Config file (AURORA_CONFIG, default `config` with any supported extension)
    /// 4. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_file = env::var("AURORA_CONFIG").unwrap_or_else(|_| "config".to_string());
        let settings_file = env::var("AURORA_SETTINGS").unwrap_or_else(|_| default_settings_file());
        Self::load_from(&config_file, &settings_file)
    }

    pub fn load_from(config_file: &str, settings_file: &str) -> Result<Self, ConfigError> {
        let mut config: Config = ConfigLoader::builder()
            .add_source(File::with_name(config_file).required(false))
            .add_source(File::new(settings_file, FileFormat::Json).required(false))
            .add_source(
                Environment::with_prefix("AURORA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.settings_file = settings_file.to_string();
        Ok(config)
    }

    pub fn registry_path(&self) -> PathBuf {
        Path::new(&self.storage_dir).join(&self.registry_filename)
    }

    /// Launch parameters for the llama-server supervisor.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            binary: self.llama_server_path.clone(),
            host: self.llama_server_host.clone(),
            port: self.llama_server_port,
            extra_args: split_args(&self.llama_server_args),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }

    pub fn readiness(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            max_attempts: self.health_check_attempts,
            interval: Duration::from_millis(self.health_check_interval_ms),
        }
    }

    pub fn settings(&self) -> Settings {
        Settings {
            host: self.host.clone(),
            storage_dir: self.storage_dir.clone(),
            llama_server_path: self.llama_server_path.clone(),
            llama_server_host: self.llama_server_host.clone(),
            llama_server_port: self.llama_server_port,
            llama_server_args: self.llama_server_args.clone(),
            default_model: self.default_model.clone(),
        }
    }

    /// Apply a settings update in place.
    ///
    /// Returns true when a llama-server launch parameter changed, which means the
    /// running engine has to be replaced.
    pub fn apply(&mut self, update: SettingsUpdate) -> bool {
        let before = self.engine_config();

        if let Some(host) = non_empty(update.host) {
            self.host = host;
        }
        if let Some(storage_dir) = non_empty(update.storage_dir) {
            self.storage_dir = storage_dir;
        }
        if let Some(path) = non_empty(update.llama_server_path) {
            self.llama_server_path = path;
        }
        if let Some(args) = update.llama_server_args {
            self.llama_server_args = args;
        }
        if let Some(host) = non_empty(update.llama_server_host) {
            self.llama_server_host = host;
        }
        if let Some(port) = update.llama_server_port.filter(|p| *p != 0) {
            self.llama_server_port = port;
        }
        if let Some(model) = non_empty(update.default_model) {
            self.default_model = model;
        }

        self.engine_config() != before
    }

    /// Persist the live-editable settings to the overlay file.
    pub fn save_settings(&self) -> std::io::Result<()> {
        let path = Path::new(&self.settings_file);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings())?;
        std::fs::write(path, json)?;
        tracing::debug!("Saved settings to {}", path.display());
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Split a command line into arguments, honouring single quotes, double quotes and
/// backslash escapes.
pub fn split_args(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_arg = false;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    in_arg = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                    in_arg = true;
                }
                c if c.is_whitespace() => {
                    if in_arg {
                        args.push(std::mem::take(&mut current));
                        in_arg = false;
                    }
                }
                c => {
                    current.push(c);
                    in_arg = true;
                }
            },
        }
    }

    if in_arg {
        args.push(current);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 11435);
        assert_eq!(config.llama_server_port, 11436);
        assert_eq!(config.default_model, "glm");
        assert_eq!(config.registry_path(), PathBuf::from("./models/models.json"));
    }

    #[test]
    fn test_readiness_defaults() {
        let policy = Config::default().readiness();
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.interval, Duration::from_millis(200));
    }

    #[test]
    fn test_split_args() {
        assert!(split_args("").is_empty());
        assert!(split_args("   ").is_empty());
        assert_eq!(
            split_args("--ctx-size 8192  -ngl 99"),
            vec!["--ctx-size", "8192", "-ngl", "99"]
        );
        assert_eq!(
            split_args(r#"--chat-template "chatml v2" --alias 'my model'"#),
            vec!["--chat-template", "chatml v2", "--alias", "my model"]
        );
        assert_eq!(split_args(r"a\ b ''"), vec!["a b", ""]);
    }

    #[test]
    fn test_apply_reports_engine_changes() {
        let mut config = Config::default();

        let changed = config.apply(SettingsUpdate {
            default_model: Some("qwen".to_string()),
            host: Some(String::new()),
            ..Default::default()
        });
        assert!(!changed);
        assert_eq!(config.default_model, "qwen");
        assert_eq!(config.host, "0.0.0.0");

        let changed = config.apply(SettingsUpdate {
            llama_server_port: Some(12000),
            ..Default::default()
        });
        assert!(changed);
        assert_eq!(config.llama_server_port, 12000);

        let changed = config.apply(SettingsUpdate {
            llama_server_args: Some("--ctx-size 4096".to_string()),
            ..Default::default()
        });
        assert!(changed);
        assert_eq!(config.engine_config().extra_args, vec!["--ctx-size", "4096"]);
    }

    #[test]
    fn test_load_from_file_and_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("config.toml");
        std::fs::write(
            &config_file,
            "port = 9000\ndefault_model = \"llama\"\n\n[models]\nllama = \"/models/llama.gguf\"\n",
        )
        .unwrap();
        let settings_file = dir.path().join("settings.json");
        std::fs::write(&settings_file, r#"{"default_model": "qwen"}"#).unwrap();

        let config = Config::load_from(
            config_file.with_extension("").to_str().unwrap(),
            settings_file.to_str().unwrap(),
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.default_model, "qwen");
        assert_eq!(
            config.models.get("llama").map(String::as_str),
            Some("/models/llama.gguf")
        );
        assert_eq!(config.settings_file, settings_file.to_str().unwrap());
    }

    #[test]
    fn test_save_settings_round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let settings_file = dir.path().join("nested").join("settings.json");
        let mut config = Config {
            settings_file: settings_file.to_str().unwrap().to_string(),
            ..Default::default()
        };
        config.apply(SettingsUpdate {
            llama_server_port: Some(12345),
            ..Default::default()
        });
        config.save_settings().unwrap();

        let missing = dir.path().join("absent");
        let loaded =
            Config::load_from(missing.to_str().unwrap(), settings_file.to_str().unwrap()).unwrap();
        assert_eq!(loaded.llama_server_port, 12345);
    }
}

//! llama-server process supervisor.
//!
//! Owns at most one llama-server child. The child is launched for a single model;
//! asking for a different model stops it and starts a new one.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock};
use tracing::Level;

use super::{EngineConfig, EngineState, ReadinessPolicy, Supervisor};
use crate::error::{Error, Result};
use crate::logs::{self, LogSink};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(1);

/// The tracked child and the model it was launched with.
#[derive(Default)]
struct EngineProcess {
    child: Option<Child>,
    model_name: Option<String>,
    model_path: Option<PathBuf>,
}

impl EngineProcess {
    /// Non-blocking liveness check.
    fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn serves(&mut self, model_path: &Path, model_name: &str) -> bool {
        self.is_alive()
            && self.model_path.as_deref() == Some(model_path)
            && self.model_name.as_deref() == Some(model_name)
    }

    fn clear(&mut self) -> Option<Child> {
        self.model_name = None;
        self.model_path = None;
        self.child.take()
    }
}

/// Supervisor for a local llama-server process.
pub struct ProcessSupervisor {
    config: EngineConfig,
    http_client: Client,
    logs: Arc<dyn LogSink>,
    /// Held for the whole of every lifecycle transition.
    process: Mutex<EngineProcess>,
    state: RwLock<EngineState>,
}

impl ProcessSupervisor {
    pub fn new(config: EngineConfig, http_client: Client, logs: Arc<dyn LogSink>) -> Self {
        Self {
            config,
            http_client,
            logs,
            process: Mutex::new(EngineProcess::default()),
            state: RwLock::new(EngineState::Stopped),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn set_state(&self, state: EngineState) {
        *self.state.write().await = state;
    }

    fn record(&self, level: Level, message: String) {
        logs::emit(self.logs.as_ref(), level, &message);
    }

    /// The configured path if it exists, otherwise a PATH lookup of the same name.
    fn resolve_binary(&self) -> Result<PathBuf> {
        let configured = Path::new(&self.config.binary);
        if configured.exists() {
            return Ok(configured.to_path_buf());
        }
        which::which(&self.config.binary).map_err(|_| {
            Error::BinaryNotFound(format!("{} (not found on PATH either)", self.config.binary))
        })
    }

    /// Forward every line of a child pipe to the log sink until it closes.
    fn drain<R>(&self, reader: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let logs = self.logs.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(target: "llama_server", "{}", line);
                logs.append(Level::INFO, &format!("llama-server: {}", line));
            }
        });
    }

    /// Terminate the tracked process gracefully, killing it after the grace period.
    /// Tracked state is cleared whatever happens.
    async fn terminate(&self, process: &mut EngineProcess) {
        let model = process.model_name.clone().unwrap_or_default();
        let Some(mut child) = process.clear() else {
            self.set_state(EngineState::Stopped).await;
            return;
        };

        self.set_state(EngineState::Stopping).await;
        self.record(Level::INFO, format!("Stopping llama-server ({})", model));

        // Try SIGTERM first on Unix
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        match tokio::time::timeout(self.config.shutdown_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("llama-server for {} exited with {}", model, status);
            }
            Ok(Err(e)) => {
                tracing::warn!("Error waiting for llama-server {}: {}", model, e);
            }
            Err(_timeout) => {
                self.record(
                    Level::WARN,
                    format!("llama-server {} didn't stop gracefully, killing", model),
                );
                let _ = child.kill().await;
            }
        }

        self.set_state(EngineState::Stopped).await;
    }

    /// Reap the child if it has exited. Skipped while a transition holds the lock.
    async fn reap_if_exited(&self) -> bool {
        let Ok(mut process) = self.process.try_lock() else {
            return false;
        };
        let status = match process.child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(Some(status))) => status,
            _ => return false,
        };
        process.clear();
        drop(process);

        self.set_state(EngineState::Stopped).await;
        self.record(
            Level::WARN,
            format!("llama-server exited before becoming healthy ({})", status),
        );
        true
    }

    async fn mark_running(&self) {
        let mut state = self.state.write().await;
        if *state == EngineState::Starting {
            *state = EngineState::Running;
        }
    }
}

#[async_trait]
impl Supervisor for ProcessSupervisor {
    async fn ensure(&self, model_path: &Path, model_name: &str) -> Result<()> {
        let mut process = self.process.lock().await;
        if process.serves(model_path, model_name) {
            return Ok(());
        }
        if process.child.is_some() {
            self.terminate(&mut process).await;
        }

        let binary = match self.resolve_binary() {
            Ok(binary) => binary,
            Err(e) => {
                self.set_state(EngineState::Stopped).await;
                self.record(Level::ERROR, e.to_string());
                return Err(e);
            }
        };

        let mut cmd = Command::new(&binary);
        cmd.arg("-m")
            .arg(model_path)
            .arg("--host")
            .arg(&self.config.host)
            .arg("--port")
            .arg(self.config.port.to_string())
            .args(&self.config.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        self.set_state(EngineState::Starting).await;
        self.record(
            Level::INFO,
            format!(
                "Starting llama-server: {} -m {} --host {} --port {} {}",
                binary.display(),
                model_path.display(),
                self.config.host,
                self.config.port,
                self.config.extra_args.join(" ")
            ),
        );

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.set_state(EngineState::Stopped).await;
                let err = Error::EngineNotReady(format!(
                    "failed to spawn {}: {}",
                    binary.display(),
                    e
                ));
                self.record(Level::ERROR, err.to_string());
                return Err(err);
            }
        };

        if let Some(stdout) = child.stdout.take() {
            self.drain(stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.drain(stderr);
        }

        tracing::info!(
            "Spawned llama-server for {} (pid: {:?})",
            model_name,
            child.id()
        );
        process.child = Some(child);
        process.model_name = Some(model_name.to_string());
        process.model_path = Some(model_path.to_path_buf());
        Ok(())
    }

    async fn stop(&self) {
        let mut process = self.process.lock().await;
        if process.child.is_none() {
            return;
        }
        self.terminate(&mut process).await;
    }

    async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url());
        match self
            .http_client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn wait_healthy(&self, policy: ReadinessPolicy) -> Result<()> {
        for attempt in 1..=policy.max_attempts {
            if self.reap_if_exited().await {
                return Err(Error::EngineNotReady(
                    "llama-server exited before becoming healthy".to_string(),
                ));
            }

            if self.health().await {
                self.mark_running().await;
                tracing::debug!("llama-server healthy after {} check(s)", attempt);
                return Ok(());
            }

            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }

        // A live child stays tracked in Starting, so the next ensure for the same
        // model keeps waiting on it instead of relaunching.
        let message = format!(
            "llama-server did not become healthy after {} attempts",
            policy.max_attempts
        );
        self.record(Level::WARN, message.clone());
        Err(Error::EngineNotReady(message))
    }

    async fn is_serving(&self, model_path: &Path, model_name: &str) -> bool {
        self.process.lock().await.serves(model_path, model_name)
    }

    async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    fn base_url(&self) -> String {
        self.config.base_url()
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        // No async cleanup here; kill_on_drop(true) reaps the child.
        tracing::debug!("ProcessSupervisor dropped, llama-server will be killed");
    }
}

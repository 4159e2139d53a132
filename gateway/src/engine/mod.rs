//! llama-server lifecycle management.
//!
//! This module defines the `Supervisor` trait that owns the single engine child
//! process, and `ProcessSupervisor`, which implements it for a local llama-server.

mod protocol;
mod supervisor;

pub use protocol::{
    ChatCompletionsChunk, ChatCompletionsRequest, ChatCompletionsResponse, CompletionChunk,
    CompletionRequest, CompletionResponse,
};
pub use supervisor::ProcessSupervisor;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Lifecycle state of the engine process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// No process is running.
    Stopped,
    /// Process spawned, not yet answering health checks.
    Starting,
    /// Process answered a health check.
    Running,
    /// Process is being shut down.
    Stopping,
}

/// Launch parameters for llama-server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Configured binary path. Looked up on PATH when it does not exist.
    pub binary: String,
    pub host: String,
    pub port: u16,
    /// Appended after the model/host/port flags.
    pub extra_args: Vec<String>,
    /// Grace period between SIGTERM and SIGKILL.
    pub shutdown_timeout: Duration,
}

impl EngineConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Health polling budget used after a (re)start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_millis(200),
        }
    }
}

/// Owner of the engine process.
///
/// `ensure` and `stop` are serialized against each other; `health` may run at any
/// time.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Make sure a live engine serves exactly this model, (re)starting it if needed.
    async fn ensure(&self, model_path: &Path, model_name: &str) -> Result<()>;

    /// Stop the engine. No-op when nothing is running.
    async fn stop(&self);

    /// One health check. Never fails; an unreachable engine is unhealthy.
    async fn health(&self) -> bool;

    /// Poll `health` until it succeeds or the budget is spent.
    async fn wait_healthy(&self, policy: ReadinessPolicy) -> Result<()>;

    /// Whether a live engine is currently loaded with exactly this model.
    async fn is_serving(&self, model_path: &Path, model_name: &str) -> bool;

    async fn state(&self) -> EngineState;

    fn base_url(&self) -> String;
}

//! Engine configuration types for agentflow.
//!
//! `EngineConfig` represents the top-level `config.toml` that controls the
//! failure policy, default retry limits, and the server/logging surface.

use serde::{Deserialize, Serialize};

use crate::workflow::RetryConfig;

/// What happens to the dependents of a failed step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Dependents stay pending until the failed step is retried or skipped.
    /// The workflow cannot terminate meanwhile.
    #[default]
    Block,
    /// Pending steps downstream of a failed step are skipped so the workflow
    /// can terminate as failed.
    SkipDependents,
}

/// Top-level configuration for the agentflow engine.
///
/// Loaded from `~/.agentflow/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Retry limits for steps added without an explicit retry config.
    #[serde(default)]
    pub default_retry: RetryConfig,

    /// Capacity of the broadcast event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Row limit for `find` when the caller gives none.
    #[serde(default = "default_find_limit")]
    pub find_limit: u32,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_event_capacity() -> usize {
    1024
}

fn default_find_limit() -> u32 {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            default_retry: RetryConfig::default(),
            event_capacity: default_event_capacity(),
            find_limit: default_find_limit(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// REST server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:7400".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
    /// Bridge spans to OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}

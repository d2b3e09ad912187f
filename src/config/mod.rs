//! # TaskRelay Configuration System
//!
//! Typed configuration for the event relay, the task worker and the agent
//! task definition. Values are layered by [`ConfigManager`]:
//!
//! 1. struct defaults
//! 2. `config/taskrelay.toml`
//! 3. `config/taskrelay.{environment}.toml`
//! 4. `TASKRELAY_*` environment variables (`__` separates nested keys)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use taskrelay::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let idle = manager.config().relay.idle_timeout();
//! let queue = manager.config().worker.resolved_task_queue();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring taskrelay.toml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskRelayConfig {
    /// Event relay service settings
    pub relay: RelayConfig,

    /// Outbound relay client used by workers
    pub relay_client: RelayClientConfig,

    /// Task executor settings
    pub worker: WorkerConfig,

    /// Task definition timeouts and retry policy
    pub workflow: WorkflowConfig,

    /// Orchestration platform connection
    pub platform: PlatformConfig,

    /// Reasoning engine endpoint
    pub engine: EngineConfig,
}

impl TaskRelayConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.relay.validate()?;
        self.relay_client.validate()?;
        self.worker.validate()?;
        self.workflow.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind_address: String,
    pub max_queue_depth: usize,
    pub idle_timeout_seconds: u64,
    pub session_ttl_seconds: u64,
    pub reaper_interval_seconds: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8090".to_string(),
            max_queue_depth: constants::relay::DEFAULT_MAX_QUEUE_DEPTH,
            idle_timeout_seconds: constants::relay::DEFAULT_IDLE_TIMEOUT_SECONDS,
            session_ttl_seconds: constants::relay::DEFAULT_SESSION_TTL_SECONDS,
            reaper_interval_seconds: constants::relay::DEFAULT_REAPER_INTERVAL_SECONDS,
        }
    }
}

impl RelayConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_queue_depth == 0 {
            return Err(ConfigurationError::invalid_value(
                "relay.max_queue_depth",
                self.max_queue_depth,
                "must be at least 1",
            ));
        }
        if self.idle_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "relay.idle_timeout_seconds",
                self.idle_timeout_seconds,
                "must be greater than zero",
            ));
        }
        if self.reaper_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "relay.reaper_interval_seconds",
                self.reaper_interval_seconds,
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayClientConfig {
    pub request_timeout_ms: u64,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub success_threshold: u32,
}

impl Default for RelayClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            success_threshold: 1,
        }
    }
}

impl RelayClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "relay_client.request_timeout_ms",
                self.request_timeout_ms,
                "must be greater than zero",
            ));
        }
        if self.failure_threshold == 0 || self.success_threshold == 0 {
            return Err(ConfigurationError::invalid_value(
                "relay_client.failure_threshold",
                format!("{}/{}", self.failure_threshold, self.success_threshold),
                "circuit breaker thresholds must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Address for the health and submission API
    pub bind_address: String,
    pub task_queue: String,
    /// When set, the queue name is namespaced per tenant
    pub tenant_id: Option<String>,
    pub max_concurrent_activities: usize,
    pub heartbeat_every_events: u64,
    pub heartbeat_interval_seconds: u64,
    pub poll_timeout_seconds: u64,
    pub shutdown_grace_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8091".to_string(),
            task_queue: constants::DEFAULT_TASK_QUEUE.to_string(),
            tenant_id: None,
            max_concurrent_activities: 8,
            heartbeat_every_events: constants::HEARTBEAT_EVERY_N_EVENTS,
            heartbeat_interval_seconds: 10,
            poll_timeout_seconds: 30,
            shutdown_grace_seconds: 30,
        }
    }
}

impl WorkerConfig {
    /// Task queue name after tenant namespacing
    pub fn resolved_task_queue(&self) -> String {
        crate::orchestration::task_queue::namespaced_queue(
            &self.task_queue,
            self.tenant_id.as_deref(),
        )
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.task_queue.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "worker.task_queue",
                "",
                "must not be empty",
            ));
        }
        if self.max_concurrent_activities == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.max_concurrent_activities",
                self.max_concurrent_activities,
                "must be at least 1",
            ));
        }
        if self.heartbeat_every_events == 0 || self.heartbeat_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.heartbeat_every_events",
                format!(
                    "{}/{}s",
                    self.heartbeat_every_events, self.heartbeat_interval_seconds
                ),
                "heartbeat cadence must be non-zero",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Hard upper bound for a single activity attempt
    pub max_execution_seconds: u64,
    /// Maximum silence between heartbeats before the attempt is considered stalled
    pub heartbeat_timeout_seconds: u64,
    /// End-to-end bound across all attempts
    pub workflow_timeout_seconds: u64,
    pub retry: RetryConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_execution_seconds: 900,
            heartbeat_timeout_seconds: 60,
            workflow_timeout_seconds: 3600,
            retry: RetryConfig::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn max_execution(&self) -> Duration {
        Duration::from_secs(self.max_execution_seconds)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_seconds)
    }

    pub fn workflow_timeout(&self) -> Duration {
        Duration::from_secs(self.workflow_timeout_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_execution_seconds == 0 || self.heartbeat_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "workflow.max_execution_seconds",
                format!(
                    "{}/{}",
                    self.max_execution_seconds, self.heartbeat_timeout_seconds
                ),
                "timeouts must be greater than zero",
            ));
        }
        if self.heartbeat_timeout_seconds >= self.max_execution_seconds {
            return Err(ConfigurationError::invalid_value(
                "workflow.heartbeat_timeout_seconds",
                self.heartbeat_timeout_seconds,
                "must be shorter than max_execution_seconds",
            ));
        }
        if self.workflow_timeout_seconds < self.max_execution_seconds {
            return Err(ConfigurationError::invalid_value(
                "workflow.workflow_timeout_seconds",
                self.workflow_timeout_seconds,
                "must be at least max_execution_seconds",
            ));
        }
        self.retry.validate()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_interval_ms: u64,
    pub backoff_coefficient: f64,
    pub maximum_interval_ms: u64,
    /// Total attempts including the first one
    pub maximum_attempts: u32,
    pub non_retryable_error_types: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1_000,
            backoff_coefficient: 2.0,
            maximum_interval_ms: 60_000,
            maximum_attempts: 3,
            non_retryable_error_types: vec![
                constants::error_types::INVALID_INPUT.to_string(),
                constants::error_types::CANCELLED.to_string(),
            ],
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.maximum_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "workflow.retry.maximum_attempts",
                self.maximum_attempts,
                "must be at least 1",
            ));
        }
        if !(self.backoff_coefficient >= 1.0) {
            return Err(ConfigurationError::invalid_value(
                "workflow.retry.backoff_coefficient",
                self.backoff_coefficient,
                "must be >= 1.0",
            ));
        }
        if self.maximum_interval_ms < self.initial_interval_ms {
            return Err(ConfigurationError::invalid_value(
                "workflow.retry.maximum_interval_ms",
                self.maximum_interval_ms,
                "must be >= initial_interval_ms",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub address: String,
    /// How often the embedded platform checks heartbeat and execution deadlines
    pub supervisor_tick_ms: u64,
    /// How long closed workflows stay describable before they are evicted
    pub closed_retention_seconds: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            address: "embedded://local".to_string(),
            supervisor_tick_ms: 500,
            closed_retention_seconds: 86_400,
        }
    }
}

impl PlatformConfig {
    pub fn supervisor_tick(&self) -> Duration {
        Duration::from_millis(self.supervisor_tick_ms.max(1))
    }

    pub fn closed_retention(&self) -> Duration {
        Duration::from_secs(self.closed_retention_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub base_url: String,
    pub connect_timeout_ms: u64,
    /// Longest accepted line in the engine's NDJSON response
    pub max_line_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout_ms: 5_000,
            max_line_bytes: 1024 * 1024,
        }
    }
}

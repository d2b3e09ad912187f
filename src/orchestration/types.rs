//! Values exchanged between the platform, executors and submitters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::workflow::WorkflowStatus;
use crate::constants::error_types;
use crate::engine::EngineError;
use crate::models::{TaskInput, TaskResult};

/// Identifies one attempt of one workflow's activity.
///
/// A token outlives its attempt: once the platform schedules a newer attempt
/// every call made with the old token is rejected as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskToken {
    pub workflow_id: Uuid,
    pub attempt: u32,
}

impl fmt::Display for TaskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.workflow_id, self.attempt)
    }
}

/// Unit of work handed to a polling executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityTask {
    pub token: TaskToken,
    pub activity_type: String,
    pub task_queue: String,
    pub input: TaskInput,
    pub heartbeat_timeout: Duration,
    pub start_to_close_timeout: Duration,
    pub scheduled_at: DateTime<Utc>,
}

impl ActivityTask {
    pub fn workflow_id(&self) -> Uuid {
        self.token.workflow_id
    }

    pub fn attempt(&self) -> u32 {
        self.token.attempt
    }
}

/// Failure reported for one attempt; the retry policy matches on `error_type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFailure {
    pub message: String,
    pub error_type: String,
    #[serde(default)]
    pub non_retryable: bool,
}

impl ActivityFailure {
    pub fn retryable(message: impl Into<String>, error_type: &str) -> Self {
        Self {
            message: message.into(),
            error_type: error_type.to_string(),
            non_retryable: false,
        }
    }

    pub fn non_retryable(message: impl Into<String>, error_type: &str) -> Self {
        Self {
            message: message.into(),
            error_type: error_type.to_string(),
            non_retryable: true,
        }
    }

    pub fn start_to_close_timeout(limit: Duration) -> Self {
        Self::retryable(
            format!("activity exceeded start-to-close timeout of {}s", limit.as_secs()),
            error_types::START_TO_CLOSE_TIMEOUT,
        )
    }

    pub fn heartbeat_timeout(limit: Duration) -> Self {
        Self::retryable(
            format!("no heartbeat within {}s", limit.as_secs()),
            error_types::HEARTBEAT_TIMEOUT,
        )
    }
}

impl From<&EngineError> for ActivityFailure {
    fn from(error: &EngineError) -> Self {
        Self {
            message: error.to_string(),
            error_type: error.error_type().to_string(),
            non_retryable: !error.is_retryable(),
        }
    }
}

/// Platform's answer to a heartbeat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub cancel_requested: bool,
}

/// Submitter-visible snapshot of a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDescription {
    pub workflow_id: Uuid,
    pub workflow_type: String,
    pub task_queue: String,
    pub status: WorkflowStatus,
    /// Attempts dispatched so far
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ActivityFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_details: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl WorkflowDescription {
    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }
}

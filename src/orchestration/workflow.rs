//! Task definition and its submitter-visible state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::retry::RetryPolicy;
use super::types::ActivityFailure;
use crate::config::WorkflowConfig;
use crate::constants::{error_types, AGENT_ACTIVITY_TYPE, AGENT_WORKFLOW_TYPE};

/// Workflow states: `scheduled → running → (completed | failed | timed_out | cancelled)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Accepted, activity not yet picked up by an executor
    Scheduled,
    /// An attempt is executing or a retry is pending
    Running,
    Completed,
    Failed,
    /// End-to-end execution timeout elapsed
    TimedOut,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Scheduled | Self::Running)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        match self {
            Self::Scheduled => !matches!(next, Self::Scheduled),
            Self::Running => !matches!(next, Self::Scheduled | Self::Running),
            _ => false,
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "timed_out" => Ok(Self::TimedOut),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid workflow status: {s}")),
        }
    }
}

/// What to do after an attempt failed
#[derive(Debug, Clone, PartialEq)]
pub enum FailureDecision {
    Retry { next_attempt: u32, delay: Duration },
    Fail,
    Cancel,
}

/// Declarative description of one unit of work.
///
/// Exactly one delegated activity; the workflow itself only applies the
/// retry policy and the timeouts to that activity's attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub workflow_type: String,
    pub activity_type: String,
    pub task_queue: String,
    pub retry_policy: RetryPolicy,
    pub start_to_close_timeout: Duration,
    pub heartbeat_timeout: Duration,
    pub execution_timeout: Duration,
}

impl WorkflowDefinition {
    /// The agent query workflow on the given queue
    pub fn agent_query(task_queue: impl Into<String>, config: &WorkflowConfig) -> Self {
        Self {
            workflow_type: AGENT_WORKFLOW_TYPE.to_string(),
            activity_type: AGENT_ACTIVITY_TYPE.to_string(),
            task_queue: task_queue.into(),
            retry_policy: RetryPolicy::from(&config.retry),
            start_to_close_timeout: config.max_execution(),
            heartbeat_timeout: config.heartbeat_timeout(),
            execution_timeout: config.workflow_timeout(),
        }
    }

    pub fn decide_on_failure(
        &self,
        attempt: u32,
        failure: &ActivityFailure,
        cancel_requested: bool,
    ) -> FailureDecision {
        if cancel_requested || failure.error_type == error_types::CANCELLED {
            return FailureDecision::Cancel;
        }
        if self.retry_policy.should_retry(attempt, failure) {
            FailureDecision::Retry {
                next_attempt: attempt + 1,
                delay: self.retry_policy.delay_for_attempt(attempt),
            }
        } else {
            FailureDecision::Fail
        }
    }
}

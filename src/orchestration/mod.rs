//! # Orchestration Platform Boundary
//!
//! The durable side of the pipeline: the task definition a submitter starts,
//! the worker-facing activity API, and the embedded platform that implements
//! both for standalone deployments and tests.
//!
//! ## Core Components
//!
//! - **WorkflowDefinition**: declarative description of one unit of work (activity, retry policy, timeouts)
//! - **WorkflowStatus**: submitter-visible state machine
//! - **ActivityWorkerApi**: what an executor needs from the platform (poll, heartbeat, report)
//! - **WorkflowClient**: what a submitter needs (start, describe, await, cancel)
//! - **InMemoryPlatform**: embedded implementation of both traits

pub mod memory;
pub mod platform;
pub mod retry;
pub mod task_queue;
pub mod types;
pub mod workflow;

pub use memory::InMemoryPlatform;
pub use platform::{ActivityWorkerApi, WorkflowClient};
pub use retry::RetryPolicy;
pub use task_queue::namespaced_queue;
pub use types::{
    ActivityFailure, ActivityTask, HeartbeatResponse, TaskToken, WorkflowDescription,
};
pub use workflow::{WorkflowDefinition, WorkflowStatus};

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(Uuid),

    /// The attempt this token names is no longer the live one
    #[error("Stale activity token {token}: {reason}")]
    StaleActivity { token: String, reason: String },

    #[error("Task queue not registered: {0}")]
    QueueNotRegistered(String),

    #[error("Invalid workflow transition from {from} to {to}")]
    InvalidTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    #[error("Orchestration platform unavailable: {0}")]
    Unavailable(String),
}

impl PlatformError {
    pub fn stale(token: &TaskToken, reason: impl Into<String>) -> Self {
        Self::StaleActivity {
            token: token.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleActivity { .. })
    }
}

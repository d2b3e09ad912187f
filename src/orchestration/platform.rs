//! Platform boundary traits.
//!
//! Executors depend only on [`ActivityWorkerApi`] and submitters only on
//! [`WorkflowClient`], so a vendor client can replace the embedded platform.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use super::types::{ActivityFailure, ActivityTask, HeartbeatResponse, TaskToken, WorkflowDescription};
use super::workflow::WorkflowDefinition;
use super::PlatformError;
use crate::models::{TaskInput, TaskResult};

#[async_trait]
pub trait ActivityWorkerApi: Send + Sync + std::fmt::Debug {
    /// Declare that this process executes `activity_type` from `task_queue`
    async fn register_activity(
        &self,
        task_queue: &str,
        activity_type: &str,
    ) -> Result<(), PlatformError>;

    /// Long-poll for the next assignment; `None` when the poll window elapses
    async fn poll_activity_task(
        &self,
        task_queue: &str,
        timeout: Duration,
    ) -> Result<Option<ActivityTask>, PlatformError>;

    async fn record_heartbeat(
        &self,
        token: &TaskToken,
        details: &str,
    ) -> Result<HeartbeatResponse, PlatformError>;

    async fn complete_activity(
        &self,
        token: &TaskToken,
        result: TaskResult,
    ) -> Result<(), PlatformError>;

    async fn fail_activity(
        &self,
        token: &TaskToken,
        failure: ActivityFailure,
    ) -> Result<(), PlatformError>;

    /// Acknowledge a cancellation request after the engine stopped
    async fn report_cancelled(&self, token: &TaskToken, details: &str)
        -> Result<(), PlatformError>;

    async fn health_check(&self) -> Result<(), PlatformError>;
}

#[async_trait]
pub trait WorkflowClient: Send + Sync + std::fmt::Debug {
    async fn start_workflow(
        &self,
        definition: &WorkflowDefinition,
        input: TaskInput,
    ) -> Result<Uuid, PlatformError>;

    async fn describe_workflow(&self, workflow_id: Uuid)
        -> Result<WorkflowDescription, PlatformError>;

    /// Resolve once the workflow reaches a terminal status
    async fn await_workflow(&self, workflow_id: Uuid)
        -> Result<WorkflowDescription, PlatformError>;

    async fn cancel_workflow(&self, workflow_id: Uuid) -> Result<(), PlatformError>;
}

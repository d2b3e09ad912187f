//! # Embedded Orchestration Platform
//!
//! In-process implementation of [`ActivityWorkerApi`] and [`WorkflowClient`].
//! Task queues deliver each attempt to one poller; a supervisor tick enforces
//! heartbeat, start-to-close and end-to-end timeouts, releases delayed
//! retries and evicts closed workflows once their retention elapses. Nothing
//! survives a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::platform::{ActivityWorkerApi, WorkflowClient};
use super::types::{
    ActivityFailure, ActivityTask, HeartbeatResponse, TaskToken, WorkflowDescription,
};
use super::workflow::{FailureDecision, WorkflowDefinition, WorkflowStatus};
use super::PlatformError;
use crate::config::PlatformConfig;
use crate::constants::error_types;
use crate::models::{TaskInput, TaskResult};

#[derive(Debug, Default)]
struct TaskQueueState {
    pending: Mutex<VecDeque<ActivityTask>>,
    activity_types: Mutex<HashSet<String>>,
    notify: Notify,
}

impl TaskQueueState {
    fn push(&self, task: ActivityTask) {
        self.pending.lock().push_back(task);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<ActivityTask> {
        self.pending.lock().pop_front()
    }

    fn is_registered(&self) -> bool {
        !self.activity_types.lock().is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveAttempt {
    attempt: u32,
    started: Instant,
    last_heartbeat: Instant,
}

#[derive(Debug)]
struct DelayedTask {
    due: Instant,
    task: ActivityTask,
}

#[derive(Debug)]
struct WorkflowRecord {
    definition: WorkflowDefinition,
    input: TaskInput,
    status: WorkflowStatus,
    /// Latest attempt number handed to a queue
    current_attempt: u32,
    dispatched_attempts: u32,
    active: Option<ActiveAttempt>,
    cancel_requested: bool,
    result: Option<TaskResult>,
    failure: Option<ActivityFailure>,
    last_heartbeat_details: Option<String>,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    started: Instant,
    closed: Option<Instant>,
    status_tx: watch::Sender<WorkflowStatus>,
}

impl WorkflowRecord {
    fn transition(&mut self, next: WorkflowStatus) -> Result<(), PlatformError> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(PlatformError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.active = None;
            self.closed_at = Some(Utc::now());
            self.closed = Some(Instant::now());
        }
        self.status_tx.send_replace(next);
        Ok(())
    }

    fn live_attempt(&mut self, token: &TaskToken) -> Result<&mut ActiveAttempt, PlatformError> {
        if self.status.is_terminal() {
            return Err(PlatformError::stale(
                token,
                format!("workflow already {}", self.status),
            ));
        }
        match self.active.as_mut() {
            Some(active) if active.attempt == token.attempt => Ok(active),
            _ => Err(PlatformError::stale(
                token,
                format!("attempt superseded by attempt {}", self.current_attempt),
            )),
        }
    }

    fn build_task(&self, workflow_id: Uuid, attempt: u32) -> ActivityTask {
        ActivityTask {
            token: TaskToken {
                workflow_id,
                attempt,
            },
            activity_type: self.definition.activity_type.clone(),
            task_queue: self.definition.task_queue.clone(),
            input: self.input.clone(),
            heartbeat_timeout: self.definition.heartbeat_timeout,
            start_to_close_timeout: self.definition.start_to_close_timeout,
            scheduled_at: Utc::now(),
        }
    }

    /// Apply the retry policy to a failed attempt; returns the retry to schedule, if any
    fn apply_failure(
        &mut self,
        workflow_id: Uuid,
        attempt: u32,
        failure: ActivityFailure,
    ) -> Result<Option<DelayedTask>, PlatformError> {
        let decision = self
            .definition
            .decide_on_failure(attempt, &failure, self.cancel_requested);
        match decision {
            FailureDecision::Retry {
                next_attempt,
                delay,
            } => {
                info!(
                    workflow_id = %workflow_id,
                    attempt,
                    next_attempt,
                    delay_ms = delay.as_millis() as u64,
                    error_type = %failure.error_type,
                    "Scheduling activity retry"
                );
                self.active = None;
                self.current_attempt = next_attempt;
                self.failure = Some(failure);
                Ok(Some(DelayedTask {
                    due: Instant::now() + delay,
                    task: self.build_task(workflow_id, next_attempt),
                }))
            }
            FailureDecision::Fail => {
                info!(
                    workflow_id = %workflow_id,
                    attempt,
                    error_type = %failure.error_type,
                    "Workflow failed"
                );
                self.result = Some(TaskResult::failed(failure.message.clone()));
                self.failure = Some(failure);
                self.transition(WorkflowStatus::Failed)?;
                Ok(None)
            }
            FailureDecision::Cancel => {
                self.failure = Some(failure);
                self.transition(WorkflowStatus::Cancelled)?;
                Ok(None)
            }
        }
    }

    fn describe(&self, workflow_id: Uuid) -> WorkflowDescription {
        WorkflowDescription {
            workflow_id,
            workflow_type: self.definition.workflow_type.clone(),
            task_queue: self.definition.task_queue.clone(),
            status: self.status,
            attempts: self.dispatched_attempts,
            result: self.result.clone(),
            failure: self.failure.clone(),
            last_heartbeat_details: self.last_heartbeat_details.clone(),
            created_at: self.created_at,
            closed_at: self.closed_at,
        }
    }
}

/// Embedded platform shared by submitters and executors of one process
#[derive(Debug)]
pub struct InMemoryPlatform {
    workflows: DashMap<Uuid, WorkflowRecord>,
    queues: DashMap<String, Arc<TaskQueueState>>,
    delayed: Mutex<Vec<DelayedTask>>,
    available: AtomicBool,
    closed_retention: Duration,
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::from_config(&PlatformConfig::default())
    }

    pub fn from_config(config: &PlatformConfig) -> Self {
        Self {
            workflows: DashMap::new(),
            queues: DashMap::new(),
            delayed: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            closed_retention: config.closed_retention(),
        }
    }

    /// Number of workflow records held, open or closed
    pub fn workflow_count(&self) -> usize {
        self.workflows.len()
    }

    /// Simulate losing (or regaining) connectivity to the platform
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    fn ensure_available(&self) -> Result<(), PlatformError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(PlatformError::Unavailable(
                "embedded platform marked unavailable".to_string(),
            ))
        }
    }

    fn queue(&self, name: &str) -> Arc<TaskQueueState> {
        Arc::clone(self.queues.entry(name.to_string()).or_default().value())
    }

    fn enqueue(&self, task: ActivityTask) {
        debug!(
            workflow_id = %task.token.workflow_id,
            attempt = task.token.attempt,
            task_queue = %task.task_queue,
            "Enqueued activity task"
        );
        self.queue(&task.task_queue).push(task);
    }

    fn schedule(&self, delayed: DelayedTask) {
        if delayed.due <= Instant::now() {
            self.enqueue(delayed.task);
        } else {
            self.delayed.lock().push(delayed);
        }
    }

    /// Claim a dequeued task for its attempt, dropping tasks that no longer apply
    fn begin_attempt(&self, task: &ActivityTask) -> bool {
        let Some(mut record) = self.workflows.get_mut(&task.token.workflow_id) else {
            return false;
        };
        if record.status.is_terminal() || record.current_attempt != task.token.attempt {
            debug!(token = %task.token, "Dropping task for closed or superseded attempt");
            return false;
        }
        if record.transition(WorkflowStatus::Running).is_err() {
            return false;
        }
        let now = Instant::now();
        record.dispatched_attempts = task.token.attempt;
        record.active = Some(ActiveAttempt {
            attempt: task.token.attempt,
            started: now,
            last_heartbeat: now,
        });
        true
    }

    /// Number of tasks waiting on a queue
    pub fn pending_tasks(&self, task_queue: &str) -> usize {
        self.queues
            .get(task_queue)
            .map(|queue| queue.pending.lock().len())
            .unwrap_or(0)
    }

    /// One supervisor pass: enforce timeouts, release due retries and evict
    /// closed workflows past retention
    pub fn supervise_once(&self) {
        let now = Instant::now();
        let mut retries = Vec::new();

        for mut entry in self.workflows.iter_mut() {
            let workflow_id = *entry.key();
            let record = entry.value_mut();
            if record.status.is_terminal() {
                continue;
            }

            if now.duration_since(record.started) >= record.definition.execution_timeout {
                warn!(workflow_id = %workflow_id, "Workflow execution timeout elapsed");
                record.failure = Some(ActivityFailure::non_retryable(
                    format!(
                        "workflow exceeded execution timeout of {}s",
                        record.definition.execution_timeout.as_secs()
                    ),
                    error_types::START_TO_CLOSE_TIMEOUT,
                ));
                if let Err(e) = record.transition(WorkflowStatus::TimedOut) {
                    warn!(workflow_id = %workflow_id, error = %e, "Failed to time out workflow");
                }
                continue;
            }

            let Some(active) = record.active else {
                continue;
            };
            let failure = if now.duration_since(active.started)
                >= record.definition.start_to_close_timeout
            {
                Some(ActivityFailure::start_to_close_timeout(
                    record.definition.start_to_close_timeout,
                ))
            } else if now.duration_since(active.last_heartbeat) >= record.definition.heartbeat_timeout
            {
                Some(ActivityFailure::heartbeat_timeout(
                    record.definition.heartbeat_timeout,
                ))
            } else {
                None
            };

            if let Some(failure) = failure {
                warn!(
                    workflow_id = %workflow_id,
                    attempt = active.attempt,
                    error_type = %failure.error_type,
                    "Activity attempt timed out"
                );
                match record.apply_failure(workflow_id, active.attempt, failure) {
                    Ok(Some(retry)) => retries.push(retry),
                    Ok(None) => {}
                    Err(e) => warn!(workflow_id = %workflow_id, error = %e, "Failed to apply timeout"),
                }
            }
        }

        let due: Vec<ActivityTask> = {
            let mut delayed = self.delayed.lock();
            delayed.extend(retries);
            let (ready, waiting): (Vec<_>, Vec<_>) =
                delayed.drain(..).partition(|delayed| delayed.due <= now);
            *delayed = waiting;
            ready.into_iter().map(|delayed| delayed.task).collect()
        };
        for task in due {
            self.enqueue(task);
        }

        let before = self.workflows.len();
        self.workflows.retain(|_, record| {
            record
                .closed
                .map_or(true, |closed| now.duration_since(closed) < self.closed_retention)
        });
        let evicted = before.saturating_sub(self.workflows.len());
        if evicted > 0 {
            debug!(evicted, "Evicted closed workflows past retention");
        }
    }

    pub fn spawn_supervisor(
        self: &Arc<Self>,
        tick: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let platform = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => platform.supervise_once(),
                }
            }
            debug!("Platform supervisor stopped");
        })
    }
}

#[async_trait]
impl ActivityWorkerApi for InMemoryPlatform {
    async fn register_activity(
        &self,
        task_queue: &str,
        activity_type: &str,
    ) -> Result<(), PlatformError> {
        self.ensure_available()?;
        self.queue(task_queue)
            .activity_types
            .lock()
            .insert(activity_type.to_string());
        info!(task_queue = %task_queue, activity_type = %activity_type, "Activity registered");
        Ok(())
    }

    async fn poll_activity_task(
        &self,
        task_queue: &str,
        timeout: Duration,
    ) -> Result<Option<ActivityTask>, PlatformError> {
        self.ensure_available()?;
        let queue = self
            .queues
            .get(task_queue)
            .map(|queue| Arc::clone(queue.value()))
            .filter(|queue| queue.is_registered())
            .ok_or_else(|| PlatformError::QueueNotRegistered(task_queue.to_string()))?;

        let deadline = Instant::now() + timeout;
        loop {
            while let Some(task) = queue.pop() {
                if self.begin_attempt(&task) {
                    return Ok(Some(task));
                }
            }
            if tokio::time::timeout_at(deadline, queue.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
            self.ensure_available()?;
        }
    }

    async fn record_heartbeat(
        &self,
        token: &TaskToken,
        details: &str,
    ) -> Result<HeartbeatResponse, PlatformError> {
        self.ensure_available()?;
        let mut record = self
            .workflows
            .get_mut(&token.workflow_id)
            .ok_or(PlatformError::UnknownWorkflow(token.workflow_id))?;
        record.live_attempt(token)?.last_heartbeat = Instant::now();
        record.last_heartbeat_details = Some(details.to_string());
        Ok(HeartbeatResponse {
            cancel_requested: record.cancel_requested,
        })
    }

    async fn complete_activity(
        &self,
        token: &TaskToken,
        result: TaskResult,
    ) -> Result<(), PlatformError> {
        self.ensure_available()?;
        let mut record = self
            .workflows
            .get_mut(&token.workflow_id)
            .ok_or(PlatformError::UnknownWorkflow(token.workflow_id))?;
        record.live_attempt(token)?;
        record.result = Some(result);
        record.transition(WorkflowStatus::Completed)?;
        info!(token = %token, "Workflow completed");
        Ok(())
    }

    async fn fail_activity(
        &self,
        token: &TaskToken,
        failure: ActivityFailure,
    ) -> Result<(), PlatformError> {
        self.ensure_available()?;
        let retry = {
            let mut record = self
                .workflows
                .get_mut(&token.workflow_id)
                .ok_or(PlatformError::UnknownWorkflow(token.workflow_id))?;
            record.live_attempt(token)?;
            record.apply_failure(token.workflow_id, token.attempt, failure)?
        };
        if let Some(retry) = retry {
            self.schedule(retry);
        }
        Ok(())
    }

    async fn report_cancelled(
        &self,
        token: &TaskToken,
        details: &str,
    ) -> Result<(), PlatformError> {
        self.ensure_available()?;
        let mut record = self
            .workflows
            .get_mut(&token.workflow_id)
            .ok_or(PlatformError::UnknownWorkflow(token.workflow_id))?;
        record.live_attempt(token)?;
        record.failure = Some(ActivityFailure::non_retryable(
            details,
            error_types::CANCELLED,
        ));
        record.transition(WorkflowStatus::Cancelled)?;
        info!(token = %token, "Workflow cancelled");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), PlatformError> {
        self.ensure_available()
    }
}

#[async_trait]
impl WorkflowClient for InMemoryPlatform {
    async fn start_workflow(
        &self,
        definition: &WorkflowDefinition,
        input: TaskInput,
    ) -> Result<Uuid, PlatformError> {
        self.ensure_available()?;
        let workflow_id = Uuid::new_v4();
        let (status_tx, _) = watch::channel(WorkflowStatus::Scheduled);
        let record = WorkflowRecord {
            definition: definition.clone(),
            input,
            status: WorkflowStatus::Scheduled,
            current_attempt: 1,
            dispatched_attempts: 0,
            active: None,
            cancel_requested: false,
            result: None,
            failure: None,
            last_heartbeat_details: None,
            created_at: Utc::now(),
            closed_at: None,
            started: Instant::now(),
            closed: None,
            status_tx,
        };
        let task = record.build_task(workflow_id, 1);
        self.workflows.insert(workflow_id, record);
        self.enqueue(task);

        info!(
            workflow_id = %workflow_id,
            workflow_type = %definition.workflow_type,
            task_queue = %definition.task_queue,
            "Workflow started"
        );
        Ok(workflow_id)
    }

    async fn describe_workflow(
        &self,
        workflow_id: Uuid,
    ) -> Result<WorkflowDescription, PlatformError> {
        self.workflows
            .get(&workflow_id)
            .map(|record| record.describe(workflow_id))
            .ok_or(PlatformError::UnknownWorkflow(workflow_id))
    }

    async fn await_workflow(
        &self,
        workflow_id: Uuid,
    ) -> Result<WorkflowDescription, PlatformError> {
        let mut status_rx = self
            .workflows
            .get(&workflow_id)
            .map(|record| record.status_tx.subscribe())
            .ok_or(PlatformError::UnknownWorkflow(workflow_id))?;

        status_rx
            .wait_for(|status| status.is_terminal())
            .await
            .map_err(|_| PlatformError::UnknownWorkflow(workflow_id))?;

        self.describe_workflow(workflow_id).await
    }

    async fn cancel_workflow(&self, workflow_id: Uuid) -> Result<(), PlatformError> {
        self.ensure_available()?;
        let mut record = self
            .workflows
            .get_mut(&workflow_id)
            .ok_or(PlatformError::UnknownWorkflow(workflow_id))?;

        let status = record.status;
        match status {
            status if status.is_terminal() => Ok(()),
            WorkflowStatus::Running if record.active.is_some() => {
                // Delivered to the executor through its next heartbeat
                record.cancel_requested = true;
                info!(workflow_id = %workflow_id, "Cancellation requested");
                Ok(())
            }
            _ => {
                record.cancel_requested = true;
                record.failure = Some(ActivityFailure::non_retryable(
                    "cancelled before an attempt was running",
                    error_types::CANCELLED,
                ));
                record.transition(WorkflowStatus::Cancelled)?;
                info!(workflow_id = %workflow_id, "Workflow cancelled before dispatch");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::constants::AGENT_ACTIVITY_TYPE;
    use crate::models::StreamDeliveryStats;
    use serde_json::json;

    const QUEUE: &str = "agent-tasks";

    fn definition() -> WorkflowDefinition {
        let mut config = WorkflowConfig::default();
        config.retry.initial_interval_ms = 1_000;
        WorkflowDefinition::agent_query(QUEUE, &config)
    }

    fn input() -> TaskInput {
        TaskInput::new(json!({"query": "count rows"}), "http://relay/events/s1")
    }

    async fn platform() -> Arc<InMemoryPlatform> {
        let platform = Arc::new(InMemoryPlatform::new());
        platform
            .register_activity(QUEUE, AGENT_ACTIVITY_TYPE)
            .await
            .unwrap();
        platform
    }

    #[tokio::test]
    async fn test_poll_unregistered_queue() {
        let platform = InMemoryPlatform::new();
        let err = platform
            .poll_activity_task("nobody", Duration::from_millis(1))
            .await
            .unwrap_err();
        assert_eq!(err, PlatformError::QueueNotRegistered("nobody".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_empty() {
        let platform = platform().await;
        let polled = platform
            .poll_activity_task(QUEUE, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(polled.is_none());
    }

    #[tokio::test]
    async fn test_complete_flow() {
        let platform = platform().await;
        let workflow_id = platform.start_workflow(&definition(), input()).await.unwrap();
        assert_eq!(
            platform.describe_workflow(workflow_id).await.unwrap().status,
            WorkflowStatus::Scheduled
        );

        let task = platform
            .poll_activity_task(QUEUE, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.attempt(), 1);
        assert_eq!(
            platform.describe_workflow(workflow_id).await.unwrap().status,
            WorkflowStatus::Running
        );

        let heartbeat = platform
            .record_heartbeat(&task.token, "events_sent=1 events_failed=0")
            .await
            .unwrap();
        assert!(!heartbeat.cancel_requested);

        platform
            .complete_activity(
                &task.token,
                TaskResult::completed(json!({"rows": 3}), StreamDeliveryStats::default()),
            )
            .await
            .unwrap();

        let description = platform.await_workflow(workflow_id).await.unwrap();
        assert_eq!(description.status, WorkflowStatus::Completed);
        assert_eq!(description.attempts, 1);
        assert_eq!(
            description.last_heartbeat_details.as_deref(),
            Some("events_sent=1 events_failed=0")
        );
        assert!(description.result.unwrap().is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_redelivers_with_backoff() {
        let platform = platform().await;
        let workflow_id = platform.start_workflow(&definition(), input()).await.unwrap();

        let first = platform
            .poll_activity_task(QUEUE, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        platform
            .fail_activity(
                &first.token,
                ActivityFailure::retryable("engine blew up", error_types::ENGINE_FAILURE),
            )
            .await
            .unwrap();

        // backoff not elapsed yet
        platform.supervise_once();
        assert_eq!(platform.pending_tasks(QUEUE), 0);

        tokio::time::advance(Duration::from_millis(1_001)).await;
        platform.supervise_once();
        let second = platform
            .poll_activity_task(QUEUE, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.attempt(), 2);

        // the first attempt's token is now stale
        let stale = platform.record_heartbeat(&first.token, "late").await.unwrap_err();
        assert!(stale.is_stale());

        platform
            .complete_activity(
                &second.token,
                TaskResult::completed(json!({}), StreamDeliveryStats::default()),
            )
            .await
            .unwrap();
        let description = platform.describe_workflow(workflow_id).await.unwrap();
        assert_eq!(description.status, WorkflowStatus::Completed);
        assert_eq!(description.attempts, 2);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_fails_workflow() {
        let platform = platform().await;
        let workflow_id = platform.start_workflow(&definition(), input()).await.unwrap();
        let task = platform
            .poll_activity_task(QUEUE, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        platform
            .fail_activity(
                &task.token,
                ActivityFailure::non_retryable("payload missing query", error_types::INVALID_INPUT),
            )
            .await
            .unwrap();

        let description = platform.await_workflow(workflow_id).await.unwrap();
        assert_eq!(description.status, WorkflowStatus::Failed);
        let result = description.result.unwrap();
        assert_eq!(result.error.as_deref(), Some("payload missing query"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_timeout_reschedules() {
        let platform = platform().await;
        let definition = definition();
        platform.start_workflow(&definition, input()).await.unwrap();
        let first = platform
            .poll_activity_task(QUEUE, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();

        tokio::time::advance(definition.heartbeat_timeout + Duration::from_secs(1)).await;
        platform.supervise_once();
        tokio::time::advance(Duration::from_secs(2)).await;
        platform.supervise_once();

        let second = platform
            .poll_activity_task(QUEUE, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.attempt(), 2);
        assert!(platform
            .complete_activity(
                &first.token,
                TaskResult::completed(json!({}), StreamDeliveryStats::default())
            )
            .await
            .unwrap_err()
            .is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn test_workflow_execution_timeout() {
        let platform = platform().await;
        let definition = definition();
        let workflow_id = platform.start_workflow(&definition, input()).await.unwrap();

        tokio::time::advance(definition.execution_timeout + Duration::from_secs(1)).await;
        platform.supervise_once();

        let description = platform.describe_workflow(workflow_id).await.unwrap();
        assert_eq!(description.status, WorkflowStatus::TimedOut);
        assert!(description.closed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_running_is_delivered_by_heartbeat() {
        let platform = platform().await;
        let workflow_id = platform.start_workflow(&definition(), input()).await.unwrap();
        let task = platform
            .poll_activity_task(QUEUE, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();

        platform.cancel_workflow(workflow_id).await.unwrap();
        let heartbeat = platform.record_heartbeat(&task.token, "").await.unwrap();
        assert!(heartbeat.cancel_requested);

        platform
            .report_cancelled(&task.token, "stopped on request")
            .await
            .unwrap();
        let description = platform.await_workflow(workflow_id).await.unwrap();
        assert_eq!(description.status, WorkflowStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_before_dispatch() {
        let platform = platform().await;
        let workflow_id = platform.start_workflow(&definition(), input()).await.unwrap();
        platform.cancel_workflow(workflow_id).await.unwrap();

        assert_eq!(
            platform.describe_workflow(workflow_id).await.unwrap().status,
            WorkflowStatus::Cancelled
        );
        // the queued task is discarded on poll
        let polled = platform
            .poll_activity_task(QUEUE, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(polled.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_workflows_evicted_after_retention() {
        let platform = Arc::new(InMemoryPlatform::from_config(&PlatformConfig {
            closed_retention_seconds: 600,
            ..PlatformConfig::default()
        }));
        platform
            .register_activity(QUEUE, AGENT_ACTIVITY_TYPE)
            .await
            .unwrap();

        let mut closed = Vec::new();
        for _ in 0..100 {
            let workflow_id = platform.start_workflow(&definition(), input()).await.unwrap();
            let task = platform
                .poll_activity_task(QUEUE, Duration::from_secs(1))
                .await
                .unwrap()
                .unwrap();
            platform
                .complete_activity(
                    &task.token,
                    TaskResult::completed(json!({}), StreamDeliveryStats::default()),
                )
                .await
                .unwrap();
            closed.push(workflow_id);
        }
        let open = platform.start_workflow(&definition(), input()).await.unwrap();

        // still describable inside the retention window
        tokio::time::advance(Duration::from_secs(300)).await;
        platform.supervise_once();
        assert_eq!(platform.workflow_count(), 101);
        assert_eq!(
            platform.describe_workflow(closed[0]).await.unwrap().status,
            WorkflowStatus::Completed
        );

        tokio::time::advance(Duration::from_secs(301)).await;
        platform.supervise_once();
        assert_eq!(platform.workflow_count(), 1);
        assert_eq!(
            platform.describe_workflow(closed[0]).await.unwrap_err(),
            PlatformError::UnknownWorkflow(closed[0])
        );
        assert_eq!(
            platform.describe_workflow(open).await.unwrap().status,
            WorkflowStatus::Scheduled
        );
    }

    #[tokio::test]
    async fn test_unavailable_platform() {
        let platform = platform().await;
        platform.set_available(false);
        assert!(matches!(
            platform.health_check().await,
            Err(PlatformError::Unavailable(_))
        ));
        platform.set_available(true);
        assert!(platform.health_check().await.is_ok());
    }
}

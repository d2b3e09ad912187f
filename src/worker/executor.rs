//! # Task Executor
//!
//! Long-polls the task queue and runs each assignment on its own tokio task,
//! bounded by a semaphore. Shutdown stops polling, marks the executor as not
//! accepting, and waits for in-flight attempts up to the grace period.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::activity::{ActivityOutcome, AgentActivity};
use crate::config::WorkerConfig;
use crate::constants::AGENT_ACTIVITY_TYPE;
use crate::orchestration::{ActivityWorkerApi, PlatformError};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Shared view of the executor for health reporting
#[derive(Debug)]
pub struct ExecutorState {
    pub(crate) capacity: usize,
    pub(crate) accepting: AtomicBool,
    pub(crate) platform_connected: AtomicBool,
    pub(crate) in_flight: AtomicUsize,
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) cancelled: AtomicU64,
}

impl ExecutorState {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            accepting: AtomicBool::new(false),
            platform_connected: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        }
    }

    /// Registered and polling; false once draining starts
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn is_platform_connected(&self) -> bool {
        self.platform_connected.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether another assignment could start right now
    pub fn has_capacity(&self) -> bool {
        self.in_flight() < self.capacity
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn record(&self, outcome: &ActivityOutcome) {
        let counter = match outcome {
            ActivityOutcome::Completed(_) => &self.completed,
            ActivityOutcome::Cancelled => &self.cancelled,
            ActivityOutcome::Failed(_) | ActivityOutcome::TimedOut(_) => &self.failed,
            ActivityOutcome::Abandoned => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct TaskExecutor {
    platform: Arc<dyn ActivityWorkerApi>,
    activity: Arc<AgentActivity>,
    task_queue: String,
    poll_timeout: Duration,
    shutdown_grace: Duration,
    max_concurrent: usize,
    permits: Arc<Semaphore>,
    state: Arc<ExecutorState>,
    shutdown: CancellationToken,
}

impl TaskExecutor {
    pub fn new(
        platform: Arc<dyn ActivityWorkerApi>,
        activity: Arc<AgentActivity>,
        config: &WorkerConfig,
    ) -> Self {
        let max_concurrent = config.max_concurrent_activities.max(1);
        Self {
            platform,
            activity,
            task_queue: config.resolved_task_queue(),
            poll_timeout: config.poll_timeout(),
            shutdown_grace: config.shutdown_grace(),
            max_concurrent,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            state: Arc::new(ExecutorState::new(max_concurrent)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    pub fn state(&self) -> Arc<ExecutorState> {
        Arc::clone(&self.state)
    }

    /// Cancelling this token starts a graceful shutdown of [`TaskExecutor::run`]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register with the platform and process assignments until shutdown
    pub async fn run(&self) -> Result<(), PlatformError> {
        self.platform
            .register_activity(&self.task_queue, AGENT_ACTIVITY_TYPE)
            .await?;
        self.state.platform_connected.store(true, Ordering::Release);
        self.state.accepting.store(true, Ordering::Release);
        info!(
            task_queue = %self.task_queue,
            max_concurrent = self.max_concurrent,
            "Task executor accepting assignments"
        );

        loop {
            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let polled = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                polled = self.platform.poll_activity_task(&self.task_queue, self.poll_timeout) => polled,
            };

            match polled {
                Ok(Some(task)) => {
                    self.state.platform_connected.store(true, Ordering::Release);
                    self.state.in_flight.fetch_add(1, Ordering::AcqRel);
                    debug!(token = %task.token, "Assignment received");

                    let activity = Arc::clone(&self.activity);
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let outcome = activity.execute(task).await;
                        state.record(&outcome);
                        state.in_flight.fetch_sub(1, Ordering::AcqRel);
                        drop(permit);
                    });
                }
                Ok(None) => {
                    self.state.platform_connected.store(true, Ordering::Release);
                }
                Err(e) => {
                    self.state.platform_connected.store(false, Ordering::Release);
                    warn!(task_queue = %self.task_queue, error = %e, "Poll failed, backing off");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        self.drain().await;
        Ok(())
    }

    async fn drain(&self) {
        self.state.accepting.store(false, Ordering::Release);
        let in_flight = self.state.in_flight();
        info!(in_flight, grace_seconds = self.shutdown_grace.as_secs(), "Task executor draining");

        let all_permits = u32::try_from(self.max_concurrent).unwrap_or(u32::MAX);
        match tokio::time::timeout(self.shutdown_grace, self.permits.acquire_many(all_permits)).await {
            Ok(_) => info!("Task executor stopped cleanly"),
            Err(_) => error!(
                in_flight = self.state.in_flight(),
                "Shutdown grace period elapsed with attempts still running"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::models::TaskInput;
    use crate::orchestration::{InMemoryPlatform, WorkflowClient, WorkflowDefinition, WorkflowStatus};
    use crate::test_helpers::{RecordingSink, ScriptedEngine};
    use crate::worker::ActivitySettings;
    use serde_json::json;

    fn executor(platform: Arc<InMemoryPlatform>, engine: ScriptedEngine) -> TaskExecutor {
        let config = WorkerConfig {
            poll_timeout_seconds: 1,
            shutdown_grace_seconds: 5,
            ..WorkerConfig::default()
        };
        let activity = Arc::new(AgentActivity::new(
            Arc::new(engine),
            platform.clone(),
            Arc::new(RecordingSink::new()),
            ActivitySettings::default(),
        ));
        TaskExecutor::new(platform, activity, &config)
    }

    #[tokio::test]
    async fn test_runs_assignments_and_drains_on_shutdown() {
        let platform = Arc::new(InMemoryPlatform::new());
        let executor = Arc::new(executor(platform.clone(), ScriptedEngine::count_rows()));
        let state = executor.state();
        let definition =
            WorkflowDefinition::agent_query(executor.task_queue(), &WorkflowConfig::default());

        let runner = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move { executor.run().await })
        };

        let workflow_id = platform
            .start_workflow(
                &definition,
                TaskInput::new(json!({"query": "count rows"}), "http://relay.local/events/e1"),
            )
            .await
            .unwrap();
        let description = platform.await_workflow(workflow_id).await.unwrap();
        assert_eq!(description.status, WorkflowStatus::Completed);

        executor.shutdown_token().cancel();
        runner.await.unwrap().unwrap();

        assert!(!state.is_accepting());
        assert_eq!(state.in_flight(), 0);
        assert_eq!(state.completed(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_platform_fails_registration() {
        let platform = Arc::new(InMemoryPlatform::new());
        platform.set_available(false);
        let executor = executor(platform, ScriptedEngine::count_rows());

        assert!(executor.run().await.is_err());
        assert!(!executor.state().is_accepting());
    }
}

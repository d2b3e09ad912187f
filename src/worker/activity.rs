//! # Agent Activity
//!
//! Executes one attempt of the agent query: runs the engine, forwards every
//! event to the relay, heartbeats, and reports the outcome through the
//! platform. The durable report never depends on relay delivery.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::heartbeat::{HeartbeatOutcome, HeartbeatPolicy, Heartbeater};
use super::relay_client::{EventForwarder, EventSink};
use crate::config::{WorkerConfig, WorkflowConfig};
use crate::constants::error_types;
use crate::engine::{EngineError, EngineOutput, EngineRequest, ReasoningEngine};
use crate::events::StreamEvent;
use crate::logging::{log_activity_operation, log_error};
use crate::models::TaskResult;
use crate::orchestration::{ActivityFailure, ActivityTask, ActivityWorkerApi};

const CANCELLED_MESSAGE: &str = "task cancelled on request";

#[derive(Debug, Clone)]
pub struct ActivitySettings {
    pub heartbeat: HeartbeatPolicy,
    /// Local bound on one attempt, applied on top of the task's start-to-close timeout
    pub max_execution: Duration,
    pub event_buffer: usize,
}

impl Default for ActivitySettings {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default(), &WorkflowConfig::default())
    }
}

impl ActivitySettings {
    pub fn from_config(worker: &WorkerConfig, workflow: &WorkflowConfig) -> Self {
        Self {
            heartbeat: HeartbeatPolicy::from(worker),
            max_execution: workflow.max_execution(),
            event_buffer: 64,
        }
    }
}

/// How one attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityOutcome {
    Completed(TaskResult),
    Failed(ActivityFailure),
    /// The local execution bound elapsed
    TimedOut(ActivityFailure),
    Cancelled,
    /// The platform no longer recognizes the attempt
    Abandoned,
}

impl ActivityOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
            Self::TimedOut(_) => "timed_out",
            Self::Cancelled => "cancelled",
            Self::Abandoned => "abandoned",
        }
    }
}

enum RunEnd {
    Engine(Result<EngineOutput, EngineError>),
    TimedOut(Duration),
    Stale,
}

#[derive(Debug)]
pub struct AgentActivity {
    engine: Arc<dyn ReasoningEngine>,
    platform: Arc<dyn ActivityWorkerApi>,
    sink: Arc<dyn EventSink>,
    settings: ActivitySettings,
}

impl AgentActivity {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        platform: Arc<dyn ActivityWorkerApi>,
        sink: Arc<dyn EventSink>,
        settings: ActivitySettings,
    ) -> Self {
        Self {
            engine,
            platform,
            sink,
            settings,
        }
    }

    /// Run the attempt and report its outcome to the platform
    pub async fn execute(&self, task: ActivityTask) -> ActivityOutcome {
        let workflow_id = task.workflow_id().to_string();
        log_activity_operation("execute", &workflow_id, task.attempt(), "started", None);

        let outcome = self.run_attempt(&task).await;
        self.report(&task, &outcome).await;

        log_activity_operation(
            "execute",
            &workflow_id,
            task.attempt(),
            outcome.label(),
            None,
        );
        outcome
    }

    async fn run_attempt(&self, task: &ActivityTask) -> ActivityOutcome {
        let forwarder = EventForwarder::new(Arc::clone(&self.sink), task.input.callback().ok());

        if let Err(e) = task.input.validate() {
            let failure = ActivityFailure::non_retryable(e.to_string(), error_types::INVALID_INPUT);
            forwarder
                .forward(&StreamEvent::terminal_error(&failure.message, error_types::INVALID_INPUT))
                .await;
            return ActivityOutcome::Failed(failure);
        }

        let limit = self.settings.max_execution.min(task.start_to_close_timeout);
        let cancel = CancellationToken::new();
        let (events_tx, mut events_rx) = mpsc::channel(self.settings.event_buffer.max(1));
        let request = EngineRequest::for_attempt(&task.token, &task.input);

        let run = self.engine.run(request, events_tx, cancel.clone());
        tokio::pin!(run);
        let deadline = tokio::time::sleep(limit);
        tokio::pin!(deadline);

        let mut heartbeater = Heartbeater::new(
            Arc::clone(&self.platform),
            task.token,
            self.settings.heartbeat,
        );
        let mut cancel_requested = false;
        let mut rejected_terminal = 0u64;

        let mut end = loop {
            let beat = tokio::select! {
                biased;
                Some(event) = events_rx.recv() => {
                    if event.is_terminal() {
                        rejected_terminal += 1;
                        false
                    } else {
                        forwarder.forward(&event).await;
                        heartbeater.record_event()
                    }
                }
                result = &mut run => break RunEnd::Engine(result),
                _ = heartbeater.interval_elapsed() => true,
                _ = &mut deadline => {
                    cancel.cancel();
                    break RunEnd::TimedOut(limit);
                }
            };

            if beat {
                match heartbeater.beat(&forwarder.stats()).await {
                    HeartbeatOutcome::Continue => {}
                    HeartbeatOutcome::CancelRequested => {
                        if !cancel_requested {
                            info!(token = %task.token, "Cancellation requested, stopping engine");
                            cancel_requested = true;
                            cancel.cancel();
                        }
                    }
                    HeartbeatOutcome::Stale => {
                        cancel.cancel();
                        break RunEnd::Stale;
                    }
                }
            }
        };

        // Events produced before the engine returned still go out ahead of the terminal event
        if !matches!(end, RunEnd::Stale) {
            while let Ok(event) = events_rx.try_recv() {
                if event.is_terminal() {
                    rejected_terminal += 1;
                    continue;
                }
                forwarder.forward(&event).await;
                if heartbeater.record_event()
                    && heartbeater.beat(&forwarder.stats()).await == HeartbeatOutcome::Stale
                {
                    end = RunEnd::Stale;
                    break;
                }
            }
        }

        debug!(
            token = %task.token,
            heartbeats = heartbeater.beats_sent(),
            events_sent = forwarder.stats().events_sent,
            "Engine run finished"
        );

        // Only the executor closes the stream
        if rejected_terminal > 0 {
            warn!(
                token = %task.token,
                engine = self.engine.name(),
                rejected = rejected_terminal,
                "Dropped terminal events emitted by the engine"
            );
        }

        match end {
            RunEnd::Stale => ActivityOutcome::Abandoned,
            RunEnd::TimedOut(limit) => {
                let failure = ActivityFailure::start_to_close_timeout(limit);
                forwarder
                    .forward(&StreamEvent::terminal_error(
                        &failure.message,
                        error_types::START_TO_CLOSE_TIMEOUT,
                    ))
                    .await;
                ActivityOutcome::TimedOut(failure)
            }
            RunEnd::Engine(Ok(output)) => {
                forwarder
                    .forward(&StreamEvent::terminal_success(output.payload.clone()))
                    .await;
                ActivityOutcome::Completed(TaskResult::completed(output.payload, forwarder.stats()))
            }
            RunEnd::Engine(Err(_)) if cancel_requested => {
                forwarder.forward(&StreamEvent::cancelled(CANCELLED_MESSAGE)).await;
                ActivityOutcome::Cancelled
            }
            RunEnd::Engine(Err(e)) => {
                warn!(token = %task.token, engine = self.engine.name(), error = %e, "Engine run failed");
                forwarder
                    .forward(&StreamEvent::terminal_error(e.to_string(), e.error_type()))
                    .await;
                ActivityOutcome::Failed(ActivityFailure::from(&e))
            }
        }
    }

    async fn report(&self, task: &ActivityTask, outcome: &ActivityOutcome) {
        let reported = match outcome {
            ActivityOutcome::Completed(result) => {
                self.platform
                    .complete_activity(&task.token, result.clone())
                    .await
            }
            ActivityOutcome::Failed(failure) | ActivityOutcome::TimedOut(failure) => {
                self.platform
                    .fail_activity(&task.token, failure.clone())
                    .await
            }
            ActivityOutcome::Cancelled => {
                self.platform
                    .report_cancelled(&task.token, CANCELLED_MESSAGE)
                    .await
            }
            ActivityOutcome::Abandoned => return,
        };

        match reported {
            Ok(()) => {}
            Err(e) if e.is_stale() => {
                warn!(token = %task.token, error = %e, "Outcome discarded, attempt already superseded");
            }
            Err(e) => log_error(
                "agent_activity",
                "report_outcome",
                &e.to_string(),
                Some(&task.token.to_string()),
            ),
        }
    }
}

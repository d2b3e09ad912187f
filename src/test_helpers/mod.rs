//! # Test Helpers
//!
//! Scripted engine, in-memory event sinks and server spawners shared by unit
//! and integration tests.

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use reqwest::Url;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{RelayConfig, TaskRelayConfig};
use crate::engine::{EngineError, EngineOutput, EngineRequest, ReasoningEngine};
use crate::events::StreamEvent;
use crate::orchestration::{InMemoryPlatform, WorkflowDefinition};
use crate::relay::{spawn_reaper, SessionRegistry};
use crate::web::{create_relay_app, create_worker_app, RelayWebState, WorkerWebState};
use crate::worker::{
    ActivitySettings, AgentActivity, EventSink, ExecutorState, HealthService, RelayClientError,
    TaskExecutor,
};

/// One step of a scripted engine run
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Emit(StreamEvent),
    Sleep(Duration),
    Succeed(Value),
    Fail(EngineError),
    /// Block until cancelled
    WaitForCancel,
}

/// Engine that replays a fixed script, optionally a different one per attempt
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    default_script: Vec<ScriptStep>,
    attempt_scripts: HashMap<u32, Vec<ScriptStep>>,
    runs: AtomicU32,
}

impl ScriptedEngine {
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            default_script: script,
            ..Self::default()
        }
    }

    /// Use `script` for one specific attempt number
    pub fn with_attempt_script(mut self, attempt: u32, script: Vec<ScriptStep>) -> Self {
        self.attempt_scripts.insert(attempt, script);
        self
    }

    /// Two progress notes then a single-row result
    pub fn count_rows() -> Self {
        Self::new(vec![
            ScriptStep::Emit(StreamEvent::progress("planning query")),
            ScriptStep::Emit(StreamEvent::progress("running query")),
            ScriptStep::Succeed(json!({"rows": [[42]], "row_count": 1})),
        ])
    }

    /// `count` progress notes then success
    pub fn emitting(count: usize) -> Self {
        let mut script: Vec<ScriptStep> = (0..count)
            .map(|i| ScriptStep::Emit(StreamEvent::progress(format!("step {i}"))))
            .collect();
        script.push(ScriptStep::Succeed(json!({"events": count})));
        Self::new(script)
    }

    /// One progress note then an engine failure
    pub fn failing_after_one_event(message: &str) -> Self {
        Self::new(vec![
            ScriptStep::Emit(StreamEvent::progress("planning query")),
            ScriptStep::Fail(EngineError::Failed(message.to_string())),
        ])
    }

    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(
        &self,
        request: EngineRequest,
        events: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<EngineOutput, EngineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let script = self
            .attempt_scripts
            .get(&request.attempt)
            .unwrap_or(&self.default_script);

        for step in script {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            match step {
                ScriptStep::Emit(event) => {
                    let _ = events.send(event.clone()).await;
                    tokio::task::yield_now().await;
                }
                ScriptStep::Sleep(duration) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                        _ = tokio::time::sleep(*duration) => {}
                    }
                }
                ScriptStep::Succeed(payload) => {
                    return Ok(EngineOutput {
                        payload: payload.clone(),
                    })
                }
                ScriptStep::Fail(error) => return Err(error.clone()),
                ScriptStep::WaitForCancel => {
                    cancel.cancelled().await;
                    return Err(EngineError::Cancelled);
                }
            }
        }
        Ok(EngineOutput { payload: json!({}) })
    }
}

fn session_of(callback: &Url) -> String {
    callback
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or_default()
        .to_string()
}

/// Sink that records events per session and can be switched to failing
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<HashMap<String, Vec<StreamEvent>>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink where every post fails, as if the relay were unreachable
    pub fn unreachable() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events_for(&self, session_id: &str) -> Vec<StreamEvent> {
        self.events
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn post_event(&self, callback: &Url, event: &StreamEvent) -> Result<(), RelayClientError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RelayClientError::Transport("connection refused".to_string()));
        }
        self.events
            .lock()
            .entry(session_of(callback))
            .or_default()
            .push(event.clone());
        Ok(())
    }
}

/// Sink that posts straight into a relay registry, skipping HTTP
#[derive(Debug)]
pub struct RegistrySink {
    registry: Arc<SessionRegistry>,
}

impl RegistrySink {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl EventSink for RegistrySink {
    async fn post_event(&self, callback: &Url, event: &StreamEvent) -> Result<(), RelayClientError> {
        self.registry
            .post_event(&session_of(callback), event.clone())
            .map(|_| ())
            .map_err(|e| RelayClientError::Transport(e.to_string()))
    }
}

/// Serve a router on an ephemeral localhost port
pub async fn spawn_app(app: Router) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

/// A relay server running in the test process
#[derive(Debug)]
pub struct TestRelay {
    pub base_url: String,
    pub registry: Arc<SessionRegistry>,
    pub shutdown: CancellationToken,
}

impl TestRelay {
    pub async fn start(config: RelayConfig) -> std::io::Result<Self> {
        let registry = Arc::new(SessionRegistry::new(&config));
        let shutdown = CancellationToken::new();
        spawn_reaper(
            Arc::clone(&registry),
            config.reaper_interval(),
            shutdown.clone(),
        );
        let addr = spawn_app(create_relay_app(Arc::new(RelayWebState::new(Arc::clone(
            &registry,
        )))))
        .await?;

        Ok(Self {
            base_url: format!("http://{addr}"),
            registry,
            shutdown,
        })
    }

    pub fn callback_url(&self, session_id: &str) -> String {
        format!("{}/events/{session_id}", self.base_url)
    }

    pub fn stream_url(&self, session_id: &str) -> String {
        format!("{}/stream/{session_id}", self.base_url)
    }
}

/// Platform, executor and worker API wired together in one process
#[derive(Debug)]
pub struct TestWorker {
    pub base_url: String,
    pub platform: Arc<InMemoryPlatform>,
    pub executor_state: Arc<ExecutorState>,
    pub definition: WorkflowDefinition,
    pub shutdown: CancellationToken,
    pub executor_handle: JoinHandle<()>,
}

impl TestWorker {
    pub async fn start(
        config: &TaskRelayConfig,
        engine: Arc<dyn ReasoningEngine>,
        sink: Arc<dyn EventSink>,
    ) -> std::io::Result<Self> {
        let platform = Arc::new(InMemoryPlatform::from_config(&config.platform));
        let shutdown = CancellationToken::new();
        platform.spawn_supervisor(config.platform.supervisor_tick(), shutdown.clone());

        let activity = Arc::new(AgentActivity::new(
            engine,
            platform.clone(),
            sink,
            ActivitySettings::from_config(&config.worker, &config.workflow),
        ));
        let executor = TaskExecutor::new(platform.clone(), activity, &config.worker);
        let executor_state = executor.state();
        let task_queue = executor.task_queue().to_string();
        let definition = WorkflowDefinition::agent_query(task_queue.clone(), &config.workflow);

        let executor_shutdown = executor.shutdown_token();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            stop.cancelled().await;
            executor_shutdown.cancel();
        });
        let executor_handle = tokio::spawn(async move {
            let _ = executor.run().await;
        });

        let health = HealthService::new(platform.clone(), Arc::clone(&executor_state), task_queue);
        let web_state = Arc::new(WorkerWebState::new(
            platform.clone(),
            definition.clone(),
            health,
        ));
        let addr = spawn_app(create_worker_app(web_state)).await?;

        // The executor registers its queue before it starts polling
        while !executor_state.is_accepting() {
            tokio::task::yield_now().await;
        }

        Ok(Self {
            base_url: format!("http://{addr}"),
            platform,
            executor_state,
            definition,
            shutdown,
            executor_handle,
        })
    }
}

/// Configuration with short timings suitable for tests
pub fn fast_test_config() -> TaskRelayConfig {
    let mut config = TaskRelayConfig::default();
    config.relay.idle_timeout_seconds = 5;
    config.worker.poll_timeout_seconds = 1;
    config.worker.heartbeat_interval_seconds = 1;
    config.worker.shutdown_grace_seconds = 5;
    config.workflow.retry.initial_interval_ms = 10;
    config.workflow.retry.maximum_interval_ms = 100;
    config.platform.supervisor_tick_ms = 20;
    config
}

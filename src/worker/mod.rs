//! # Task Executor (Worker)
//!
//! Polls the platform for agent query attempts, runs the reasoning engine,
//! streams every event to the relay on a best-effort basis, heartbeats, and
//! returns the authoritative result through the platform.

pub mod activity;
pub mod executor;
pub mod health;
pub mod heartbeat;
pub mod relay_client;

pub use activity::{ActivityOutcome, ActivitySettings, AgentActivity};
pub use executor::{ExecutorState, TaskExecutor};
pub use health::{BasicHealthResponse, HealthService, WorkerHealthReport};
pub use heartbeat::{heartbeat_details, HeartbeatOutcome, HeartbeatPolicy, Heartbeater};
pub use relay_client::{EventForwarder, EventSink, RelayClient, RelayClientError};

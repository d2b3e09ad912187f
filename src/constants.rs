//! # System Constants
//!
//! Wire names and default values shared by the relay, the worker and the
//! task definition.

/// Activity type registered by workers and referenced by the task definition
pub const AGENT_ACTIVITY_TYPE: &str = "run_agent_query";

/// Workflow type name for the agent query task definition
pub const AGENT_WORKFLOW_TYPE: &str = "agent_query_workflow";

/// Default task queue polled by workers
pub const DEFAULT_TASK_QUEUE: &str = "agent-tasks";

/// Separator between tenant id and queue name
pub const TENANT_QUEUE_SEPARATOR: char = '.';

/// Heartbeat every N forwarded events
pub const HEARTBEAT_EVERY_N_EVENTS: u64 = 5;

/// Media type for the relay stream body
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

pub mod relay {
    /// Maximum buffered events per session before the oldest is evicted
    pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 1000;

    /// Seconds a subscription waits for the next event before closing
    pub const DEFAULT_IDLE_TIMEOUT_SECONDS: u64 = 300;

    /// Seconds an unsubscribed session may sit idle before the reaper drops it
    pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 900;

    pub const DEFAULT_REAPER_INTERVAL_SECONDS: u64 = 30;
}

pub mod error_types {
    //! Error classes carried on activity failures. Retry policies match on these.

    pub const INVALID_INPUT: &str = "InvalidInput";
    pub const ENGINE_FAILURE: &str = "EngineFailure";
    pub const ENGINE_TRANSPORT: &str = "EngineTransport";
    pub const START_TO_CLOSE_TIMEOUT: &str = "StartToCloseTimeout";
    pub const HEARTBEAT_TIMEOUT: &str = "HeartbeatTimeout";
    pub const CANCELLED: &str = "Cancelled";
}

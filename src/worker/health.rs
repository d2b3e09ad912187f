//! # Worker Health Service
//!
//! Liveness and readiness for the executor. Ready means the platform answers
//! and a new assignment could start now: the executor is polling and has a
//! free slot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::executor::ExecutorState;
use crate::orchestration::ActivityWorkerApi;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicHealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHealthReport {
    pub status: String,
    pub ready: bool,
    pub accepting_assignments: bool,
    pub platform_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_error: Option<String>,
    pub task_queue: String,
    pub in_flight: usize,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct HealthService {
    platform: Arc<dyn ActivityWorkerApi>,
    state: Arc<ExecutorState>,
    task_queue: String,
    started: Instant,
}

impl HealthService {
    pub fn new(
        platform: Arc<dyn ActivityWorkerApi>,
        state: Arc<ExecutorState>,
        task_queue: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            state,
            task_queue: task_queue.into(),
            started: Instant::now(),
        }
    }

    pub fn liveness(&self) -> BasicHealthResponse {
        BasicHealthResponse {
            status: "alive".to_string(),
            timestamp: Utc::now(),
        }
    }

    pub async fn detailed_health(&self) -> WorkerHealthReport {
        let platform_error = self.platform.health_check().await.err().map(|e| e.to_string());
        let platform_connected = platform_error.is_none();
        let accepting = self.state.is_accepting() && self.state.has_capacity();
        let ready = platform_connected && accepting;

        WorkerHealthReport {
            status: if ready { "healthy" } else { "degraded" }.to_string(),
            ready,
            accepting_assignments: accepting,
            platform_connected,
            platform_error,
            task_queue: self.task_queue.clone(),
            in_flight: self.state.in_flight(),
            completed: self.state.completed(),
            failed: self.state.failed(),
            cancelled: self.state.cancelled(),
            uptime_seconds: self.started.elapsed().as_secs(),
            timestamp: Utc::now(),
        }
    }

    /// `Err` carries the report when the worker should not receive traffic
    pub async fn readiness(&self) -> Result<WorkerHealthReport, WorkerHealthReport> {
        let report = self.detailed_health().await;
        if report.ready {
            Ok(report)
        } else {
            Err(report)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::InMemoryPlatform;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_not_ready_until_accepting() {
        let platform = Arc::new(InMemoryPlatform::new());
        let state = Arc::new(ExecutorState::new(1));
        let health = HealthService::new(platform, Arc::clone(&state), "agent-tasks");

        let report = health.readiness().await.unwrap_err();
        assert!(report.platform_connected);
        assert!(!report.accepting_assignments);
        assert_eq!(report.status, "degraded");

        state.accepting.store(true, Ordering::Release);
        let report = health.readiness().await.unwrap();
        assert_eq!(report.status, "healthy");
        assert_eq!(report.task_queue, "agent-tasks");
    }

    #[tokio::test]
    async fn test_not_ready_when_every_slot_is_busy() {
        let platform = Arc::new(InMemoryPlatform::new());
        let state = Arc::new(ExecutorState::new(1));
        state.accepting.store(true, Ordering::Release);
        let health = HealthService::new(platform, Arc::clone(&state), "agent-tasks");

        state.in_flight.store(1, Ordering::Release);
        let report = health.readiness().await.unwrap_err();
        assert!(report.platform_connected);
        assert!(!report.accepting_assignments);
        assert_eq!(report.in_flight, 1);

        state.in_flight.store(0, Ordering::Release);
        assert!(health.readiness().await.is_ok());
    }

    #[tokio::test]
    async fn test_platform_outage_is_reported() {
        let platform = Arc::new(InMemoryPlatform::new());
        let state = Arc::new(ExecutorState::new(1));
        state.accepting.store(true, Ordering::Release);
        let health = HealthService::new(platform.clone(), state, "agent-tasks");

        platform.set_available(false);
        let report = health.detailed_health().await;
        assert!(!report.ready);
        assert!(report.platform_error.is_some());
        assert_eq!(health.liveness().status, "alive");
    }
}

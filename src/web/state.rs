//! # Web Application State
//!
//! Shared state handed to the relay and worker routers.

use std::sync::Arc;
use std::time::Instant;

use crate::orchestration::{WorkflowClient, WorkflowDefinition};
use crate::relay::SessionRegistry;
use crate::worker::HealthService;

#[derive(Debug)]
pub struct RelayWebState {
    pub registry: Arc<SessionRegistry>,
    started: Instant,
}

impl RelayWebState {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            started: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

#[derive(Debug)]
pub struct WorkerWebState {
    workflows: Arc<dyn WorkflowClient>,
    definition: WorkflowDefinition,
    health: HealthService,
}

impl WorkerWebState {
    pub fn new(
        workflows: Arc<dyn WorkflowClient>,
        definition: WorkflowDefinition,
        health: HealthService,
    ) -> Self {
        Self {
            workflows,
            definition,
            health,
        }
    }

    pub fn workflows(&self) -> &dyn WorkflowClient {
        self.workflows.as_ref()
    }

    /// Task definition new submissions are started with
    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn health_service(&self) -> &HealthService {
        &self.health
    }
}

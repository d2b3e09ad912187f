//! # Health Check Handlers
//!
//! Relay health with session statistics, and Kubernetes-style probes for the
//! worker. Worker handlers delegate to [`HealthService`](crate::worker::HealthService).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;

use crate::web::response_types::{ErrorResponse, RelayHealthResponse};
use crate::web::state::{RelayWebState, WorkerWebState};
use crate::worker::{BasicHealthResponse, WorkerHealthReport};

/// Relay health: GET /health
pub async fn relay_health(State(state): State<Arc<RelayWebState>>) -> Json<RelayHealthResponse> {
    Json(RelayHealthResponse {
        status: "healthy".to_string(),
        sessions: state.registry.session_count(),
        stats: state.registry.stats().snapshot(),
        uptime_seconds: state.uptime_seconds(),
        timestamp: Utc::now(),
    })
}

/// Worker health: GET /health
///
/// Always 200; the body says whether the worker is degraded.
pub async fn worker_health(State(state): State<Arc<WorkerWebState>>) -> Json<WorkerHealthReport> {
    Json(state.health_service().detailed_health().await)
}

/// Liveness probe: GET /health/live
pub async fn liveness_check(State(state): State<Arc<WorkerWebState>>) -> Json<BasicHealthResponse> {
    Json(state.health_service().liveness())
}

/// Readiness probe: GET /health/ready
///
/// 503 while the platform is unreachable or assignments are not being accepted.
pub async fn readiness_check(
    State(state): State<Arc<WorkerWebState>>,
) -> Result<Json<WorkerHealthReport>, (StatusCode, Json<ErrorResponse>)> {
    match state.health_service().readiness().await {
        Ok(report) => Ok(Json(report)),
        Err(report) => {
            let reason = match (report.platform_connected, report.accepting_assignments) {
                (false, _) => "orchestration platform unreachable",
                (true, false) => "worker is not accepting assignments",
                (true, true) => "worker is not ready",
            };
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new("service_unavailable", reason)),
            ))
        }
    }
}

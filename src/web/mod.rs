//! # Web API Module
//!
//! Two axum applications: the relay service (event intake, session streams)
//! and the worker's health and task submission API.

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

pub mod handlers;
pub mod response_types;
pub mod state;

pub use response_types::{ApiError, ApiResult, ErrorResponse};
pub use state::{RelayWebState, WorkerWebState};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn request_timeout() -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT)
}

/// Relay routes. The stream route is exempt from the request timeout so a
/// subscriber can wait out the full idle window.
pub fn create_relay_app(state: Arc<RelayWebState>) -> Router {
    let bounded = Router::new()
        .route("/health", get(handlers::health::relay_health))
        .route("/events/{session_id}", post(handlers::events::post_event))
        .layer(request_timeout());

    let streaming =
        Router::new().route("/stream/{session_id}", get(handlers::stream::stream_session));

    let app = Router::new()
        .merge(bounded)
        .merge(streaming)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state);

    info!("Relay web application created");
    app
}

/// Worker routes: probes plus the submission API
pub fn create_worker_app(state: Arc<WorkerWebState>) -> Router {
    let bounded = Router::new()
        .route("/health", get(handlers::health::worker_health))
        .route("/health/live", get(handlers::health::liveness_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .route("/v1/tasks", post(handlers::tasks::create_task))
        .route("/v1/tasks/{task_id}", get(handlers::tasks::get_task))
        .route("/v1/tasks/{task_id}/cancel", post(handlers::tasks::cancel_task))
        .layer(request_timeout());

    // Awaiting a result may legitimately take as long as the task itself
    let awaiting = Router::new().route(
        "/v1/tasks/{task_id}/result",
        get(handlers::tasks::get_task_result),
    );

    let app = Router::new()
        .merge(bounded)
        .merge(awaiting)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state);

    info!("Worker web application created");
    app
}

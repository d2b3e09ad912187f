//! # Web API Response Types
//!
//! Error type for both HTTP apps and the JSON bodies they return.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::orchestration::{ActivityFailure, PlatformError, WorkflowStatus};
use crate::relay::{RelayError, RelayStatsSnapshot};
use crate::models::TaskResult;

/// Standard error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
        }
    }
}

impl From<PlatformError> for ApiError {
    fn from(error: PlatformError) -> Self {
        match error {
            PlatformError::UnknownWorkflow(id) => Self::NotFound(format!("task {id}")),
            PlatformError::InvalidTransition { .. } | PlatformError::StaleActivity { .. } => {
                Self::Conflict(error.to_string())
            }
            PlatformError::QueueNotRegistered(_) | PlatformError::Unavailable(_) => {
                Self::ServiceUnavailable(error.to_string())
            }
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(error: RelayError) -> Self {
        Self::BadRequest(error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        (status, Json(ErrorResponse::new(code, self.to_string()))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Acknowledgement for `POST /events/{session_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostEventResponse {
    pub session_id: String,
    pub accepted: bool,
    /// False when the session already ended and the event was dropped
    pub buffered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayHealthResponse {
    pub status: String,
    pub sessions: usize,
    pub stats: RelayStatsSnapshot,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreationResponse {
    pub task_id: Uuid,
    pub status: WorkflowStatus,
    pub task_queue: String,
    pub created_at: DateTime<Utc>,
}

/// Durable outcome of a task, as returned by the result endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultResponse {
    pub task_id: Uuid,
    pub status: WorkflowStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ActivityFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCancelResponse {
    pub task_id: Uuid,
    pub status: WorkflowStatus,
    pub cancel_requested: bool,
}

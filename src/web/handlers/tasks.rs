//! # Task Submission Handlers
//!
//! Start an agent query, inspect it, await its durable result, or cancel it.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::TaskInput;
use crate::orchestration::{WorkflowDescription, WorkflowStatus};
use crate::web::response_types::{
    ApiError, ApiResult, TaskCancelResponse, TaskCreationResponse, TaskResultResponse,
};
use crate::web::state::WorkerWebState;

/// Create a task: POST /v1/tasks
pub async fn create_task(
    State(state): State<Arc<WorkerWebState>>,
    Json(input): Json<TaskInput>,
) -> ApiResult<(StatusCode, Json<TaskCreationResponse>)> {
    input
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let definition = state.definition();
    let task_id = state.workflows().start_workflow(definition, input).await?;
    let description = state.workflows().describe_workflow(task_id).await?;
    info!(task_id = %task_id, task_queue = %definition.task_queue, "Task submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskCreationResponse {
            task_id,
            status: description.status,
            task_queue: description.task_queue,
            created_at: description.created_at,
        }),
    ))
}

/// Task status: GET /v1/tasks/{task_id}
pub async fn get_task(
    State(state): State<Arc<WorkerWebState>>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<WorkflowDescription>> {
    Ok(Json(state.workflows().describe_workflow(task_id).await?))
}

/// Durable result: GET /v1/tasks/{task_id}/result
///
/// Holds the request open until the task reaches a terminal status.
pub async fn get_task_result(
    State(state): State<Arc<WorkerWebState>>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskResultResponse>> {
    let description = state.workflows().await_workflow(task_id).await?;
    Ok(Json(TaskResultResponse {
        task_id,
        status: description.status,
        attempts: description.attempts,
        result: description.result,
        failure: description.failure,
    }))
}

/// Cancel: POST /v1/tasks/{task_id}/cancel
pub async fn cancel_task(
    State(state): State<Arc<WorkerWebState>>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<TaskCancelResponse>)> {
    state.workflows().cancel_workflow(task_id).await?;
    let description = state.workflows().describe_workflow(task_id).await?;
    info!(task_id = %task_id, status = %description.status, "Task cancellation requested");

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskCancelResponse {
            task_id,
            // false when the task had already finished on its own
            cancel_requested: !matches!(
                description.status,
                WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::TimedOut
            ),
            status: description.status,
        }),
    ))
}

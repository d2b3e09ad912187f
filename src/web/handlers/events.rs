//! Event intake: `POST /events/{session_id}`

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use crate::events::StreamEvent;
use crate::relay::PostOutcome;
use crate::web::response_types::{ApiResult, PostEventResponse};
use crate::web::state::RelayWebState;

/// Buffer one event on the session queue.
///
/// Accepted regardless of subscribers; only a malformed session id or body is rejected.
pub async fn post_event(
    State(state): State<Arc<RelayWebState>>,
    Path(session_id): Path<String>,
    Json(event): Json<StreamEvent>,
) -> ApiResult<(StatusCode, Json<PostEventResponse>)> {
    let outcome = state.registry.post_event(&session_id, event)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PostEventResponse {
            session_id,
            accepted: true,
            buffered: matches!(outcome, PostOutcome::Buffered { .. }),
        }),
    ))
}

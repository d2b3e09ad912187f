//! Session stream: `GET /stream/{session_id}`
//!
//! Newline-delimited JSON, one event per line. The body ends after a
//! terminal event; an idle timeout ends it with a final error line.

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info};

use crate::constants::NDJSON_CONTENT_TYPE;
use crate::events::StreamEvent;
use crate::relay::RelayError;
use crate::web::response_types::ApiResult;
use crate::web::state::RelayWebState;

fn ndjson_line(item: Result<StreamEvent, RelayError>) -> Bytes {
    let value = match item {
        Ok(event) => serde_json::to_vec(&event),
        Err(e) => serde_json::to_vec(&json!({
            "error": e.code(),
            "message": e.to_string(),
        })),
    };
    match value {
        Ok(mut line) => {
            line.push(b'\n');
            Bytes::from(line)
        }
        Err(e) => {
            error!(error = %e, "Failed to encode stream line");
            Bytes::from_static(b"{\"error\":\"encoding_failed\"}\n")
        }
    }
}

pub async fn stream_session(
    State(state): State<Arc<RelayWebState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Response> {
    let subscription = state.registry.subscribe(&session_id)?;
    info!(session_id = %session_id, "Stream subscriber attached");

    // Dropping the body (client disconnect) drops the subscription with it
    let body = subscription
        .into_stream()
        .map(|item| Ok::<_, Infallible>(ndjson_line(item)));

    Ok((
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_idle_timeout_line() {
        let line = ndjson_line(Err(RelayError::IdleTimeout {
            session_id: "s1".to_string(),
            idle: Duration::from_secs(300),
        }));
        let text = std::str::from_utf8(&line).unwrap();
        assert!(text.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["error"], "idle_timeout");
        assert!(value["message"].as_str().unwrap().contains("s1"));
    }

    #[test]
    fn test_event_line() {
        let line = ndjson_line(Ok(StreamEvent::progress("hello")));
        let event: StreamEvent =
            serde_json::from_slice(line.strip_suffix(b"\n").unwrap()).unwrap();
        assert_eq!(event.data["message"], "hello");
    }
}

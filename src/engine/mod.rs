//! # Reasoning Engine Boundary
//!
//! The engine is an opaque async producer: it emits zero or more
//! [`StreamEvent`]s on a channel and finally returns one result or error.
//! Cancellation is cooperative; engines check the token at their own yield
//! points and return [`EngineError::Cancelled`].

pub mod http;

pub use http::HttpEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::constants::error_types;
use crate::events::StreamEvent;
use crate::models::TaskInput;
use crate::orchestration::TaskToken;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Engine failed: {0}")]
    Failed(String),

    #[error("Engine run cancelled")]
    Cancelled,

    #[error("Engine transport error: {0}")]
    Transport(String),
}

impl EngineError {
    /// Error class reported to the platform's retry policy
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => error_types::INVALID_INPUT,
            Self::Failed(_) => error_types::ENGINE_FAILURE,
            Self::Cancelled => error_types::CANCELLED,
            Self::Transport(_) => error_types::ENGINE_TRANSPORT,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Transport(_))
    }
}

/// What the engine is asked to do for one attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRequest {
    pub workflow_id: Uuid,
    pub attempt: u32,
    pub task_payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl EngineRequest {
    pub fn for_attempt(token: &TaskToken, input: &TaskInput) -> Self {
        Self {
            workflow_id: token.workflow_id,
            attempt: token.attempt,
            task_payload: input.task_payload.clone(),
            continuation_id: input.continuation_id.clone(),
            session_id: input.session_id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    pub payload: Value,
}

#[async_trait]
pub trait ReasoningEngine: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Run one request to completion.
    ///
    /// Intermediate events go to `events`; a closed receiver is not an error.
    async fn run(
        &self,
        request: EngineRequest,
        events: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<EngineOutput, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            EngineError::InvalidInput("x".into()).error_type(),
            error_types::INVALID_INPUT
        );
        assert!(!EngineError::InvalidInput("x".into()).is_retryable());
        assert!(!EngineError::Cancelled.is_retryable());
        assert!(EngineError::Failed("boom".into()).is_retryable());
        assert!(EngineError::Transport("refused".into()).is_retryable());
    }

    #[test]
    fn test_request_carries_session() {
        let token = TaskToken {
            workflow_id: Uuid::new_v4(),
            attempt: 2,
        };
        let input = TaskInput::new(json!({"query": "count rows"}), "http://relay/events/s1")
            .with_continuation("conv-1");
        let request = EngineRequest::for_attempt(&token, &input);
        assert_eq!(request.attempt, 2);
        assert_eq!(request.session_id.as_deref(), Some("s1"));
        assert_eq!(request.continuation_id.as_deref(), Some("conv-1"));
    }
}

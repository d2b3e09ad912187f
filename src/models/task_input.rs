//! TaskInput
//!
//! Request payload for one unit of work. Built once by the submitter and
//! never mutated after the task starts.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TaskRelayError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInput {
    /// Free-form payload handed to the reasoning engine (e.g. query + target resource)
    pub task_payload: Value,

    /// Conversation to continue, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_id: Option<String>,

    /// Full relay URL events are pushed to, e.g. `http://relay/events/s1`
    pub callback_url: String,
}

impl TaskInput {
    pub fn new(task_payload: Value, callback_url: impl Into<String>) -> Self {
        Self {
            task_payload,
            continuation_id: None,
            callback_url: callback_url.into(),
        }
    }

    pub fn with_continuation(mut self, continuation_id: impl Into<String>) -> Self {
        self.continuation_id = Some(continuation_id.into());
        self
    }

    /// Reject inputs no amount of retrying could fix
    pub fn validate(&self) -> Result<()> {
        if self.task_payload.is_null() {
            return Err(TaskRelayError::Validation(
                "task_payload must not be null".to_string(),
            ));
        }
        self.callback()?;
        Ok(())
    }

    /// Parsed callback URL
    pub fn callback(&self) -> Result<Url> {
        let url = Url::parse(&self.callback_url).map_err(|e| {
            TaskRelayError::Validation(format!(
                "invalid callback_url '{}': {e}",
                self.callback_url
            ))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(TaskRelayError::Validation(format!(
                "callback_url scheme must be http or https, got '{other}'"
            ))),
        }
    }

    /// Session id encoded as the last path segment of the callback URL
    pub fn session_id(&self) -> Option<String> {
        let url = self.callback().ok()?;
        url.path_segments()?
            .filter(|segment| !segment.is_empty())
            .last()
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_id_from_callback() {
        let input = TaskInput::new(json!({"query": "count rows"}), "http://relay/events/s1");
        assert!(input.validate().is_ok());
        assert_eq!(input.session_id().as_deref(), Some("s1"));
    }

    #[test]
    fn test_invalid_callback_rejected() {
        let input = TaskInput::new(json!({"query": "q"}), "not a url");
        assert!(matches!(input.validate(), Err(TaskRelayError::Validation(_))));

        let input = TaskInput::new(json!({"query": "q"}), "ftp://relay/events/s1");
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_null_payload_rejected() {
        let input = TaskInput::new(Value::Null, "http://relay/events/s1");
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_continuation_round_trips_optional() {
        let input = TaskInput::new(json!({"query": "q"}), "http://relay/events/s1");
        let encoded = serde_json::to_value(&input).unwrap();
        assert!(encoded.get("continuation_id").is_none());

        let decoded: TaskInput = serde_json::from_value(json!({
            "task_payload": {"query": "q"},
            "continuation_id": "conv-7",
            "callback_url": "http://relay/events/s1"
        }))
        .unwrap();
        assert_eq!(decoded.continuation_id.as_deref(), Some("conv-7"));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Closed set of event kinds carried on a session stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    /// Free-form progress note from the engine
    Progress,
    /// Fragment of a generated artifact (e.g. SQL text)
    Artifact,
    /// A batch of result rows
    ResultRows,
    /// Final event of a successful run
    TerminalSuccess,
    /// Final event of a failed or cancelled run
    TerminalError,
}

impl StreamEventType {
    /// Terminal events close every subscription on the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TerminalSuccess | Self::TerminalError)
    }
}

impl fmt::Display for StreamEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress => write!(f, "progress"),
            Self::Artifact => write!(f, "artifact"),
            Self::ResultRows => write!(f, "result_rows"),
            Self::TerminalSuccess => write!(f, "terminal_success"),
            Self::TerminalError => write!(f, "terminal_error"),
        }
    }
}

impl std::str::FromStr for StreamEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "progress" => Ok(Self::Progress),
            "artifact" => Ok(Self::Artifact),
            "result_rows" => Ok(Self::ResultRows),
            "terminal_success" => Ok(Self::TerminalSuccess),
            "terminal_error" => Ok(Self::TerminalError),
            _ => Err(format!("Invalid stream event type: {s}")),
        }
    }
}

/// One ordered increment of progress or the final outcome of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub event_type: StreamEventType,
    #[serde(default)]
    pub data: Value,
    #[serde(default = "Utc::now")]
    pub emitted_at: DateTime<Utc>,
}

impl StreamEvent {
    pub fn new(event_type: StreamEventType, data: Value) -> Self {
        Self {
            event_type,
            data,
            emitted_at: Utc::now(),
        }
    }

    pub fn progress(message: impl Into<String>) -> Self {
        Self::new(StreamEventType::Progress, json!({ "message": message.into() }))
    }

    pub fn terminal_success(result: Value) -> Self {
        Self::new(StreamEventType::TerminalSuccess, result)
    }

    pub fn terminal_error(message: impl Into<String>, error_type: &str) -> Self {
        Self::new(
            StreamEventType::TerminalError,
            json!({ "message": message.into(), "error_type": error_type }),
        )
    }

    /// Terminal error marking a run stopped on request
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(
            StreamEventType::TerminalError,
            json!({
                "message": reason.into(),
                "error_type": crate::constants::error_types::CANCELLED,
                "cancelled": true,
            }),
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_uses_type_key() {
        let event = StreamEvent::progress("planning query");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "progress");
        assert_eq!(value["data"]["message"], "planning query");
        assert!(value["emitted_at"].is_string());
    }

    #[test]
    fn test_missing_emitted_at_defaults_to_now() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"result_rows","data":{"rows":[[1]]}}"#).unwrap();
        assert_eq!(event.event_type, StreamEventType::ResultRows);
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let parsed = serde_json::from_str::<StreamEvent>(r#"{"type":"chart","data":{}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(StreamEvent::terminal_success(json!({})).is_terminal());
        assert!(StreamEvent::terminal_error("boom", "EngineFailure").is_terminal());
        assert!(StreamEvent::cancelled("stop").is_terminal());
        assert_eq!(
            "terminal_error".parse::<StreamEventType>().unwrap(),
            StreamEventType::TerminalError
        );
    }
}

//! # Event Relay
//!
//! In-memory, session-scoped fan-out of [`StreamEvent`](crate::events::StreamEvent)s.
//!
//! Workers push events with [`SessionRegistry::post_event`]; clients read them
//! back in arrival order through [`SessionRegistry::subscribe`]. Each session
//! owns a bounded buffer: once it reaches `max_queue_depth` the oldest event is
//! evicted. Nothing is persisted and nothing survives a restart.
//!
//! A subscription ends when it yields a terminal event, when no event arrives
//! within the idle window, or when the subscriber goes away. The last
//! subscriber leaving removes the session; abandoned sessions that never got a
//! subscriber are removed by the [`reaper`].

pub mod reaper;
pub mod registry;
pub mod session;
pub mod subscription;

use std::time::Duration;
use thiserror::Error;

pub use reaper::spawn_reaper;
pub use registry::{RelayStats, RelayStatsSnapshot, SessionRegistry};
pub use session::{PostOutcome, SessionQueue};
pub use subscription::Subscription;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("No event for session {session_id} within {idle:?}")]
    IdleTimeout { session_id: String, idle: Duration },

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),
}

impl RelayError {
    /// Stable machine-readable code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            Self::IdleTimeout { .. } => "idle_timeout",
            Self::InvalidSessionId(_) => "invalid_session_id",
        }
    }
}

const MAX_SESSION_ID_LEN: usize = 256;

/// Session ids are opaque but must be safe to carry in a URL path segment
pub fn validate_session_id(session_id: &str) -> Result<(), RelayError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
    if valid {
        Ok(())
    } else {
        Err(RelayError::InvalidSessionId(session_id.to_string()))
    }
}

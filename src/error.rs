use thiserror::Error;

use crate::config::ConfigurationError;
use crate::engine::EngineError;
use crate::orchestration::PlatformError;
use crate::relay::RelayError;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum TaskRelayError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Orchestration platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TaskRelayError>;

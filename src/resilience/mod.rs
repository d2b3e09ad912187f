//! # Resilience Module
//!
//! Circuit breaker used to isolate the worker from an unreachable relay.
//! Event delivery is best-effort, so once the relay has failed enough times in
//! a row the worker stops paying connection timeouts for it until the recovery
//! window has passed.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use taskrelay::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new(
//!     "relay_client".to_string(),
//!     CircuitBreakerConfig {
//!         failure_threshold: 5,
//!         timeout: Duration::from_secs(30),
//!         success_threshold: 1,
//!     },
//! );
//!
//! let result = breaker.call(|| async { Ok::<_, String>("posted") }).await;
//! # let _ = result;
//! # }
//! ```

pub mod circuit_breaker;

use serde::Serialize;
use std::time::Duration;

use crate::config::RelayClientConfig;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call is allowed
    pub timeout: Duration,
    /// Successful trial calls needed to close the circuit again
    pub success_threshold: u32,
}

impl From<&RelayClientConfig> for CircuitBreakerConfig {
    fn from(config: &RelayClientConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            timeout: std::time::Duration::from_millis(config.recovery_timeout_ms),
            success_threshold: config.success_threshold,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub rejected_count: u64,
    pub consecutive_failures: u64,
    pub half_open_calls: u64,
    pub current_state: CircuitState,
}

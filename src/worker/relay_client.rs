//! # Relay Client
//!
//! Fire-and-forget delivery of stream events to the relay callback address.
//! Failures are reported to the caller for counting and never propagate
//! further; an open circuit skips the network entirely.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, Url};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::RelayClientConfig;
use crate::events::StreamEvent;
use crate::models::StreamDeliveryStats;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

#[derive(Debug, Error)]
pub enum RelayClientError {
    #[error("Relay transport error: {0}")]
    Transport(String),

    #[error("Relay rejected event with HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Relay circuit open for {origin}")]
    CircuitOpen { origin: String },
}

/// Destination for streamed events
#[async_trait]
pub trait EventSink: Send + Sync + std::fmt::Debug {
    async fn post_event(&self, callback: &Url, event: &StreamEvent) -> Result<(), RelayClientError>;
}

/// HTTP sink with one circuit breaker per relay origin
#[derive(Debug)]
pub struct RelayClient {
    http: Client,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    breaker_config: CircuitBreakerConfig,
}

impl RelayClient {
    pub fn new(config: &RelayClientConfig) -> Result<Self, RelayClientError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(format!("taskrelay-worker/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayClientError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            breakers: DashMap::new(),
            breaker_config: CircuitBreakerConfig::from(config),
        })
    }

    fn breaker_for(&self, origin: &str) -> Arc<CircuitBreaker> {
        Arc::clone(
            self.breakers
                .entry(origin.to_string())
                .or_insert_with(|| {
                    Arc::new(CircuitBreaker::new(
                        format!("relay:{origin}"),
                        self.breaker_config.clone(),
                    ))
                })
                .value(),
        )
    }
}

#[async_trait]
impl EventSink for RelayClient {
    async fn post_event(&self, callback: &Url, event: &StreamEvent) -> Result<(), RelayClientError> {
        let origin = callback.origin().ascii_serialization();
        let breaker = self.breaker_for(&origin);

        let outcome = breaker
            .call(|| async {
                let response = self
                    .http
                    .post(callback.clone())
                    .json(event)
                    .send()
                    .await
                    .map_err(|e| RelayClientError::Transport(e.to_string()))?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(RelayClientError::HttpStatus {
                        status: response.status().as_u16(),
                    })
                }
            })
            .await;

        match outcome {
            Ok(()) => Ok(()),
            Err(CircuitBreakerError::CircuitOpen { .. }) => {
                Err(RelayClientError::CircuitOpen { origin })
            }
            Err(CircuitBreakerError::OperationFailed(e)) => Err(e),
        }
    }
}

/// Per-attempt forwarder that counts what reached the relay.
///
/// A missing or unusable callback address turns every forward into a counted
/// failure instead of an error.
#[derive(Debug)]
pub struct EventForwarder {
    sink: Arc<dyn EventSink>,
    callback: Option<Url>,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl EventForwarder {
    pub fn new(sink: Arc<dyn EventSink>, callback: Option<Url>) -> Self {
        Self {
            sink,
            callback,
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Best-effort delivery; returns whether the relay accepted the event
    pub async fn forward(&self, event: &StreamEvent) -> bool {
        let Some(callback) = self.callback.as_ref() else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        match self.sink.post_event(callback, event).await {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    callback = %callback,
                    event_type = %event.event_type,
                    error = %e,
                    "Event delivery to relay failed"
                );
                false
            }
        }
    }

    pub fn stats(&self) -> StreamDeliveryStats {
        StreamDeliveryStats {
            events_sent: self.sent.load(Ordering::Relaxed),
            events_failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

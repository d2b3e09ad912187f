#![allow(clippy::doc_markdown)] // Allow technical terms like NDJSON, axum in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # TaskRelay
//!
//! Durable execution of long-running agent queries with live progress
//! streaming.
//!
//! ## Overview
//!
//! A client submits a task and receives a task id. The task runs as an
//! attempt on a worker process that polls a durable orchestration platform.
//! While the reasoning engine works, the worker pushes every progress event to
//! an in-memory **event relay**, which fans them out to stream subscribers by
//! session id. The final result is always recorded through the platform, so a
//! lost stream never loses a result.
//!
//! ## Architecture
//!
//! - **Event Relay** ([`relay`], [`web::create_relay_app`]): session-scoped
//!   bounded buffers, subscriptions that end on a terminal event or an idle
//!   timeout, and a reaper for abandoned sessions.
//! - **Task Executor** ([`worker`]): polls a task queue, runs one
//!   [`engine::ReasoningEngine`] call per attempt, forwards events
//!   best-effort, heartbeats, and honours cancellation.
//! - **Task Definition** ([`orchestration`]): the agent query workflow with
//!   its retry policy and timeouts, plus an in-process platform implementation.
//!
//! ## Module Organization
//!
//! - [`config`] - Layered TOML and environment configuration
//! - [`error`] - Crate-wide error type
//! - [`events`] - Stream event wire schema
//! - [`models`] - Task input and result payloads
//! - [`resilience`] - Circuit breaker for relay delivery
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskrelay::config::RelayConfig;
//! use taskrelay::events::StreamEvent;
//! use taskrelay::relay::SessionRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(SessionRegistry::new(&RelayConfig::default()));
//! registry.post_event("session-1", StreamEvent::progress("planning"))?;
//!
//! let mut subscription = registry.subscribe("session-1")?;
//! while let Some(event) = subscription.next_event().await {
//!     println!("{:?}", event?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib                        # Unit tests
//! cargo test --features test-helpers      # Unit, HTTP integration and property tests
//! ```

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod relay;
pub mod resilience;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod web;
pub mod worker;

pub use config::{ConfigManager, TaskRelayConfig};
pub use error::{Result, TaskRelayError};
pub use events::{StreamEvent, StreamEventType};
pub use models::{StreamDeliveryStats, TaskInput, TaskResult, TaskStatus};
pub use orchestration::{InMemoryPlatform, WorkflowDefinition, WorkflowStatus};
pub use relay::{RelayError, SessionRegistry};

//! # Web API Request Handlers
//!
//! Relay handlers (`events`, `stream`), worker handlers (`tasks`) and health
//! probes for both processes.

pub mod events;
pub mod health;
pub mod stream;
pub mod tasks;

//! # Stream Events
//!
//! Wire schema for the progress and terminal events a worker pushes to the
//! relay and the relay re-serves to subscribers.

pub mod types;

pub use types::{StreamEvent, StreamEventType};

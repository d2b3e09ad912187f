//! # Task Models
//!
//! Immutable request payload and authoritative result of one unit of work.

pub mod task_input;
pub mod task_result;

pub use task_input::TaskInput;
pub use task_result::{StreamDeliveryStats, TaskResult, TaskStatus};

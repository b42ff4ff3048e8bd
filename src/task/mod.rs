// src/task/mod.rs

//! Schedulable units of work.
//!
//! - [`node`] holds [`TaskNode`], the cancelable `Ready -> Executing ->
//!   Finished` state machine wrapping one asynchronous body.
//! - [`context`] provides the [`TaskContext`] a body runs with (cancellation
//!   checks, registry access, predecessors).
//! - [`outcome`] defines the outcome and status types shared with the queue,
//!   the scheduler and the fan-out primitives.

pub mod context;
pub mod node;
pub mod outcome;

pub use context::{TaskContext, TaskEnv};
pub use node::{TaskId, TaskNode, TaskNodeBuilder};
pub use outcome::{Canceled, NodeOutcome, TaskOutcome, TaskStatus};

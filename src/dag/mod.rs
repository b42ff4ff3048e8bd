// src/dag/mod.rs

//! Dependency graph and scheduling.
//!
//! - [`graph`] validates a set of [`TaskNode`](crate::task::TaskNode)s and
//!   keeps predecessor/dependent adjacency.
//! - [`scheduler`] contains the pure state machine that decides which nodes
//!   may be admitted and when the whole graph has drained.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//!
//! The async side (subscribing to node completion and feeding the queue)
//! lives in [`engine::runtime`](crate::engine::runtime).

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;

pub use graph::DependencyGraph;
pub use scheduler::{Scheduler, SlotState};
pub use scheduler_step::SchedulerStep;

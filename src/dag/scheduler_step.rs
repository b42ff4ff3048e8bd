// src/dag/scheduler_step.rs

//! Step-by-step result type for the scheduler.

use crate::task::TaskNode;

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the graph and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Nodes whose dependencies all finished in this step, ordered by
    /// priority (higher first) and then insertion order. The caller admits
    /// them into the queue in this order.
    pub newly_ready: Vec<TaskNode>,
    /// Whether this step finished the last node of the graph.
    pub graph_just_finished: bool,
}

impl SchedulerStep {
    pub(crate) fn nothing() -> Self {
        Self::default()
    }
}

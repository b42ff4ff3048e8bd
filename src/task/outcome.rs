// src/task/outcome.rs

//! Outcomes of units of work and the public status view of a node.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// Marker error produced by cooperative cancellation checks.
///
/// Bodies usually propagate it with `?` from [`TaskContext::checkpoint`] or
/// [`TaskContext::sleep`]; it is mapped to [`TaskOutcome::Canceled`] rather
/// than to a failure.
///
/// [`TaskContext::checkpoint`]: crate::task::TaskContext::checkpoint
/// [`TaskContext::sleep`]: crate::task::TaskContext::sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("task was canceled")]
pub struct Canceled;

/// Exactly one of these is produced for every submitted unit of work.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Succeeded(T),
    Failed(anyhow::Error),
    /// The unit never ran, or observed cancellation before finishing.
    Canceled,
}

impl<T> TaskOutcome<T> {
    /// Classify a body result. An error carrying [`Canceled`] is a
    /// cancellation, anything else is a failure.
    pub fn from_result(result: anyhow::Result<T>) -> Self {
        match result {
            Ok(value) => TaskOutcome::Succeeded(value),
            Err(err) if err.is::<Canceled>() => TaskOutcome::Canceled,
            Err(err) => TaskOutcome::Failed(err),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskOutcome::Canceled)
    }

    /// The success value, if any.
    pub fn success(self) -> Option<T> {
        match self {
            TaskOutcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }
}

/// Outcome recorded on a [`TaskNode`](crate::task::TaskNode).
///
/// Unlike [`TaskOutcome`] this is cheap to clone, so that dependents can read
/// the result of their predecessors.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    Succeeded,
    Failed(Arc<anyhow::Error>),
    Canceled,
}

impl NodeOutcome {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, NodeOutcome::Succeeded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, NodeOutcome::Failed(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, NodeOutcome::Canceled)
    }
}

impl From<TaskOutcome<()>> for NodeOutcome {
    fn from(outcome: TaskOutcome<()>) -> Self {
        match outcome {
            TaskOutcome::Succeeded(()) => NodeOutcome::Succeeded,
            TaskOutcome::Failed(err) => NodeOutcome::Failed(Arc::new(err)),
            TaskOutcome::Canceled => NodeOutcome::Canceled,
        }
    }
}

/// Internal lifecycle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeState {
    Ready,
    Executing,
    Finished,
}

/// Public, read-only view of a node's lifecycle.
///
/// `Canceled` is a finished node whose outcome is a cancellation; for
/// scheduling purposes it counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Ready,
    Executing,
    Finished,
    Canceled,
}

impl TaskStatus {
    pub(crate) fn from_parts(state: NodeState, outcome: Option<&NodeOutcome>) -> Self {
        match (state, outcome) {
            (NodeState::Ready, _) => TaskStatus::Ready,
            (NodeState::Executing, _) => TaskStatus::Executing,
            (NodeState::Finished, Some(NodeOutcome::Canceled)) => TaskStatus::Canceled,
            (NodeState::Finished, _) => TaskStatus::Finished,
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

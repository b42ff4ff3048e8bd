// src/task/node.rs

//! The schedulable unit of work.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{BootError, Result};
use crate::lock;
use crate::task::context::TaskContext;
use crate::task::outcome::{panic_message, NodeOutcome, NodeState, TaskOutcome, TaskStatus};
use crate::types::Affinity;

type TaskBody = Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique identity of a [`TaskNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A cancelable unit of asynchronous work with an explicit lifecycle.
///
/// `TaskNode` is a cheap handle; clones refer to the same node. The
/// lifecycle is `Ready -> Executing -> Finished`, where cancellation can
/// finish a node that never started. Whatever the body does (succeed, fail,
/// panic), the node always ends up `Finished` so that its dependents make
/// progress.
#[derive(Clone)]
pub struct TaskNode {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    id: TaskId,
    name: String,
    priority: i32,
    affinity: Affinity,
    state: watch::Sender<NodeState>,
    token: CancellationToken,
    deps: Mutex<Vec<TaskNode>>,
    body: Mutex<Option<TaskBody>>,
    /// `Some` exactly when `state` is `Finished`. The lock also serializes
    /// every state transition.
    outcome: Mutex<Option<NodeOutcome>>,
}

/// Builder for nodes that need a priority hint or an affinity.
pub struct TaskNodeBuilder {
    name: String,
    priority: i32,
    affinity: Affinity,
}

impl TaskNodeBuilder {
    /// Ordering hint among nodes that become ready at the same time; higher
    /// runs first. It never preempts anything.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn body<F, Fut>(self, body: F) -> TaskNode
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boxed: TaskBody = Box::new(move |ctx| body(ctx).boxed());
        TaskNode::from_parts(self.name, self.priority, self.affinity, Some(boxed))
    }

    /// A node with nothing to do; it finishes as soon as it is started.
    pub fn noop(self) -> TaskNode {
        TaskNode::from_parts(self.name, self.priority, self.affinity, None)
    }
}

impl TaskNode {
    /// Create a node running `body` with default priority and affinity.
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::builder(name).body(body)
    }

    pub fn noop(name: impl Into<String>) -> Self {
        Self::builder(name).noop()
    }

    pub fn builder(name: impl Into<String>) -> TaskNodeBuilder {
        TaskNodeBuilder {
            name: name.into(),
            priority: 0,
            affinity: Affinity::default(),
        }
    }

    fn from_parts(name: String, priority: i32, affinity: Affinity, body: Option<TaskBody>) -> Self {
        let (state, _) = watch::channel(NodeState::Ready);
        Self {
            inner: Arc::new(NodeInner {
                id: TaskId::next(),
                name,
                priority,
                affinity,
                state,
                token: CancellationToken::new(),
                deps: Mutex::new(Vec::new()),
                body: Mutex::new(body),
                outcome: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn priority(&self) -> i32 {
        self.inner.priority
    }

    pub fn affinity(&self) -> Affinity {
        self.inner.affinity
    }

    pub fn status(&self) -> TaskStatus {
        let outcome = lock(&self.inner.outcome);
        TaskStatus::from_parts(*self.inner.state.borrow(), outcome.as_ref())
    }

    pub fn is_finished(&self) -> bool {
        *self.inner.state.borrow() == NodeState::Finished
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Outcome of the node, once it has finished.
    pub fn outcome(&self) -> Option<NodeOutcome> {
        lock(&self.inner.outcome).clone()
    }

    /// Snapshot of this node's predecessors.
    pub fn dependencies(&self) -> Vec<TaskNode> {
        lock(&self.inner.deps).clone()
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Declare that this node must not start before `other` has finished.
    ///
    /// Only allowed while the node is still `Ready`.
    pub fn add_dependency(&self, other: &TaskNode) -> Result<()> {
        if other.id() == self.id() {
            return Err(BootError::ConfigError(format!(
                "task '{}' cannot depend on itself",
                self.name()
            )));
        }

        // Hold the transition lock so the node cannot start underneath us.
        let _outcome = lock(&self.inner.outcome);
        if *self.inner.state.borrow() != NodeState::Ready {
            return Err(BootError::DependencyAfterStart(self.name().to_string()));
        }

        let mut deps = lock(&self.inner.deps);
        if !deps.iter().any(|d| d.id() == other.id()) {
            deps.push(other.clone());
        }
        Ok(())
    }

    /// Request cancellation. Idempotent and callable from any thread.
    ///
    /// A node that has not started yet finishes right away as canceled and
    /// its body never runs. A running body observes the request at its next
    /// cooperative check point.
    pub fn cancel(&self) {
        self.inner.token.cancel();

        let mut outcome = lock(&self.inner.outcome);
        if *self.inner.state.borrow() == NodeState::Ready && outcome.is_none() {
            debug!(task = %self.name(), id = %self.id(), "canceled before start");
            *outcome = Some(NodeOutcome::Canceled);
            self.inner.state.send_replace(NodeState::Finished);
        }
    }

    /// Mark the node finished with success from outside its body.
    ///
    /// Used by work that completes on an external signal. Returns `false` if
    /// the node had already finished; the first completion wins.
    pub fn set_finished(&self) -> bool {
        self.finish(NodeOutcome::Succeeded)
    }

    /// Wait until the node has finished (successfully, with a failure, or
    /// canceled).
    pub async fn finished(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives as long as `self`, so this cannot observe a
        // closed channel.
        let _ = rx.wait_for(|state| *state == NodeState::Finished).await;
    }

    /// Run the node to completion.
    ///
    /// No-op (beyond finishing as canceled) if the node was canceled before
    /// it got here, and a no-op if it already finished.
    pub async fn start(&self, ctx: TaskContext) {
        if !self.begin() {
            debug!(task = %self.name(), id = %self.id(), "not starting; node already finished");
            return;
        }

        let body = lock(&self.inner.body).take();
        let Some(body) = body else {
            self.finish(NodeOutcome::Succeeded);
            return;
        };

        info!(task = %self.name(), id = %self.id(), "task started");

        // Primary bodies only hold the lane while polled, so they can hand
        // work to the primary context and wait for it.
        let lane = ctx.primary_lane().clone();
        let fut = match self.affinity() {
            Affinity::Primary => lane.run(body(ctx)).boxed(),
            Affinity::Any => body(ctx),
        };

        let mut state_rx = self.inner.state.subscribe();
        let run = AssertUnwindSafe(fut).catch_unwind();

        let result = tokio::select! {
            res = run => Some(res),
            _ = state_rx.wait_for(|state| *state == NodeState::Finished) => None,
        };

        let outcome = match result {
            None => {
                debug!(task = %self.name(), "finished externally; dropping body");
                return;
            }
            Some(Err(payload)) => {
                let msg = panic_message(payload.as_ref());
                warn!(task = %self.name(), panic = %msg, "task body panicked");
                NodeOutcome::Failed(Arc::new(anyhow::anyhow!("task panicked: {msg}")))
            }
            Some(Ok(res)) => match TaskOutcome::from_result(res) {
                TaskOutcome::Succeeded(()) if self.is_cancelled() => NodeOutcome::Canceled,
                TaskOutcome::Failed(_) if self.is_cancelled() => NodeOutcome::Canceled,
                other => other.into(),
            },
        };

        self.finish(outcome);
    }

    /// `Ready -> Executing`. Returns `false` if the node must not run.
    fn begin(&self) -> bool {
        let mut outcome = lock(&self.inner.outcome);
        if outcome.is_some() {
            return false;
        }
        if self.inner.token.is_cancelled() {
            *outcome = Some(NodeOutcome::Canceled);
            self.inner.state.send_replace(NodeState::Finished);
            return false;
        }
        self.inner.state.send_if_modified(|state| {
            if *state == NodeState::Ready {
                *state = NodeState::Executing;
                true
            } else {
                false
            }
        })
    }

    /// Record `outcome` and move to `Finished`, unless already finished.
    fn finish(&self, outcome: NodeOutcome) -> bool {
        let mut slot = lock(&self.inner.outcome);
        if slot.is_some() {
            return false;
        }

        match &outcome {
            NodeOutcome::Succeeded => info!(task = %self.name(), id = %self.id(), "task finished"),
            NodeOutcome::Failed(err) => {
                warn!(task = %self.name(), id = %self.id(), error = %err, "task failed")
            }
            NodeOutcome::Canceled => info!(task = %self.name(), id = %self.id(), "task canceled"),
        }

        *slot = Some(outcome);
        self.inner.state.send_replace(NodeState::Finished);
        true
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

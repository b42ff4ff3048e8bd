// src/task/context.rs

//! Execution context handed to every task body.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::dispatch::PrimaryLane;
use crate::registry::Registry;
use crate::task::node::TaskNode;
use crate::task::outcome::Canceled;

/// Shared environment every node of one engine runs in.
#[derive(Clone, Default)]
pub struct TaskEnv {
    registry: Arc<Registry>,
    primary_lane: PrimaryLane,
}

impl TaskEnv {
    pub fn new(registry: Arc<Registry>, primary_lane: PrimaryLane) -> Self {
        Self {
            registry,
            primary_lane,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn primary_lane(&self) -> &PrimaryLane {
        &self.primary_lane
    }
}

/// What a task body sees while it runs.
///
/// Cancellation is cooperative: bodies are expected to call
/// [`checkpoint`](Self::checkpoint) around their side effects, and to use
/// [`sleep`](Self::sleep) (or race [`cancelled`](Self::cancelled)) instead of
/// suspending blindly.
#[derive(Clone)]
pub struct TaskContext {
    node: TaskNode,
    env: TaskEnv,
}

impl TaskContext {
    pub fn new(node: TaskNode, env: TaskEnv) -> Self {
        Self { node, env }
    }

    pub fn name(&self) -> &str {
        self.node.name()
    }

    /// The node this body belongs to.
    pub fn node(&self) -> &TaskNode {
        &self.node
    }

    pub fn token(&self) -> CancellationToken {
        self.node.token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.node.is_cancelled()
    }

    /// `Err(Canceled)` once cancellation was requested.
    pub fn checkpoint(&self) -> Result<(), Canceled> {
        if self.is_cancelled() {
            Err(Canceled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, checking for cancellation before and after the
    /// suspension. Wakes up early if the node is canceled meanwhile.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Canceled> {
        self.checkpoint()?;
        let token = self.token();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = token.cancelled() => {}
        }
        self.checkpoint()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        self.token().cancelled().await
    }

    /// Predecessors of this node, e.g. to inspect their outcomes.
    pub fn dependencies(&self) -> Vec<TaskNode> {
        self.node.dependencies()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.env.registry()
    }

    /// Shorthand for `self.registry().resolve::<T>()`.
    pub fn resolve<T>(&self) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        self.env.registry().resolve::<T>()
    }

    pub fn primary_lane(&self) -> &PrimaryLane {
        self.env.primary_lane()
    }
}

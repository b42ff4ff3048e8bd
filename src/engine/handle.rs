// src/engine/handle.rs

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dispatch::Dispatcher;
use crate::errors::{BootError, Result};
use crate::gate::ReadinessGate;
use crate::lock;
use crate::plugin::{LifecycleEvent, LifecyclePlugin};
use crate::queue::TaskQueue;
use crate::registry::Registry;
use crate::task::TaskNode;

pub type PluginRef = Arc<dyn LifecyclePlugin>;

struct EngineInner {
    registry: Arc<Registry>,
    dispatcher: Arc<dyn Dispatcher>,
    queue: TaskQueue,
    tasks: Vec<TaskNode>,
    gate: Arc<ReadinessGate<PluginRef>>,
    runner: Mutex<Option<JoinHandle<Result<()>>>>,
}

/// A started engine. Cheap to clone.
///
/// Everything that talks to plugins goes through the readiness gate: calls
/// made before every task has finished are buffered and replayed in order
/// when the gate opens.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<EngineInner>,
}

impl EngineHandle {
    pub(crate) fn new(
        registry: Arc<Registry>,
        dispatcher: Arc<dyn Dispatcher>,
        queue: TaskQueue,
        tasks: Vec<TaskNode>,
        gate: Arc<ReadinessGate<PluginRef>>,
        runner: JoinHandle<Result<()>>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry,
                dispatcher,
                queue,
                tasks,
                gate,
                runner: Mutex::new(Some(runner)),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    pub fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        Arc::clone(&self.inner.dispatcher)
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.inner.queue
    }

    /// Every startup task, in provider order.
    pub fn tasks(&self) -> &[TaskNode] {
        &self.inner.tasks
    }

    /// First task named `name`.
    pub fn task(&self, name: &str) -> Option<&TaskNode> {
        self.inner.tasks.iter().find(|task| task.name() == name)
    }

    pub fn for_each<F>(&self, action: F)
    where
        F: Fn(&PluginRef) + Send + 'static,
    {
        self.inner.gate.for_each(action);
    }

    /// `true` while not ready (the predicate is buffered).
    pub fn all_satisfy<F>(&self, predicate: F) -> bool
    where
        F: Fn(&PluginRef) -> bool + Send + 'static,
    {
        self.inner.gate.all_satisfy(predicate)
    }

    /// `None` while not ready.
    pub fn fold<R, F>(&self, init: R, f: F) -> Option<R>
    where
        F: FnMut(R, &PluginRef) -> R,
    {
        self.inner.gate.fold(init, f)
    }

    /// Forward `event` to every plugin that handles it.
    pub fn broadcast(&self, event: LifecycleEvent) {
        debug!(%event, ready = self.is_ready(), "broadcasting lifecycle event");
        let kind = event.kind();
        self.for_each(move |plugin| {
            if plugin.handles(kind) {
                plugin.handle(&event);
            }
        });
    }

    /// Ask every plugin that handles `event`; `true` if none objects.
    ///
    /// Before the gate opens the question is buffered and this answers
    /// `true`.
    pub fn all_accept(&self, event: LifecycleEvent) -> bool {
        let kind = event.kind();
        self.all_satisfy(move |plugin| !plugin.handles(kind) || plugin.handle(&event))
    }

    pub fn is_ready(&self) -> bool {
        self.inner.gate.is_ready()
    }

    /// Resolves once every task finished and the buffered calls replayed.
    pub async fn wait_ready(&self) {
        self.inner.gate.wait_ready().await
    }

    /// Cancel every task that has not finished yet.
    ///
    /// Tasks still waiting for dependencies finish as canceled right away;
    /// running tasks stop at their next check point. The graph still drains
    /// and the gate still opens.
    pub fn cancel_all(&self) {
        info!("canceling all startup tasks");
        self.inner.queue.cancel_all();
        for task in &self.inner.tasks {
            task.cancel();
        }
    }

    /// Wait for the graph runner to finish and report its result.
    ///
    /// Only the first caller gets the runner's result; later callers just
    /// wait for readiness.
    pub async fn join(&self) -> Result<()> {
        let runner = lock(&self.inner.runner).take();
        match runner {
            Some(runner) => runner.await.map_err(|e| {
                BootError::Other(anyhow::anyhow!("graph runner task failed: {e}"))
            })?,
            None => {
                self.wait_ready().await;
                Ok(())
            }
        }
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("tasks", &self.inner.tasks.len())
            .field("queue", &self.inner.queue)
            .field("gate", &self.inner.gate)
            .finish_non_exhaustive()
    }
}

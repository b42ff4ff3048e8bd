// src/engine/runtime.rs

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::dag::{DependencyGraph, Scheduler, SchedulerStep};
use crate::errors::{BootError, Result};
use crate::queue::TaskQueue;
use crate::task::TaskId;

/// Events flowing into the runner while a graph drains.
#[derive(Debug, Clone, Copy)]
pub enum RunnerEvent {
    /// A node reached `Finished`, whatever its outcome.
    NodeFinished(TaskId),
}

/// Async shell around the pure [`Scheduler`].
///
/// Responsibilities:
/// - Watch every node of the graph for completion.
/// - Admit nodes into the [`TaskQueue`] as the scheduler releases them.
/// - Once every node finished, add a barrier to the queue that runs the
///   completion callback.
pub struct GraphRunner {
    scheduler: Scheduler,
    queue: TaskQueue,
}

impl GraphRunner {
    pub fn new(graph: DependencyGraph, queue: TaskQueue) -> Self {
        Self {
            scheduler: Scheduler::new(graph),
            queue,
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Drive the graph to completion, then run `on_drained` as a queue
    /// barrier and wait for it.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn run<F>(mut self, on_drained: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<RunnerEvent>();

        for node in self.scheduler.graph().nodes() {
            let node = node.clone();
            let tx = events_tx.clone();
            tokio::spawn(async move {
                node.finished().await;
                let _ = tx.send(RunnerEvent::NodeFinished(node.id()));
            });
        }
        drop(events_tx);

        info!(tasks = self.scheduler.graph().len(), "graph runner started");

        let mut step = self.scheduler.start();
        while !self.apply(step) {
            let Some(event) = events_rx.recv().await else {
                return Err(BootError::Other(anyhow::anyhow!(
                    "graph runner stalled: completion watchers exited before every task finished"
                )));
            };
            debug!(?event, "graph runner received event");

            step = match event {
                RunnerEvent::NodeFinished(id) => self.scheduler.handle_finished(id),
            };
        }

        let (done_tx, done_rx) = oneshot::channel::<()>();
        self.queue.add_barrier(move || {
            on_drained();
            let _ = done_tx.send(());
        });

        done_rx.await.map_err(|_| {
            BootError::Other(anyhow::anyhow!("completion barrier was dropped before running"))
        })?;

        info!("graph runner finished");
        Ok(())
    }

    /// Admit what became ready. Returns `true` once the graph has drained.
    fn apply(&self, step: SchedulerStep) -> bool {
        for node in step.newly_ready {
            self.queue.add(node);
        }
        step.graph_just_finished
    }
}

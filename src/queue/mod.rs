// src/queue/mod.rs

//! Bounded-concurrency admission queue.
//!
//! [`TaskQueue`] keeps a FIFO backlog of admitted [`TaskNode`]s and barrier
//! callbacks, and promotes the oldest backlog item whenever fewer than
//! `max_concurrency` nodes are running. Each promoted node runs in its own
//! Tokio task.
//!
//! Ordering:
//! - with `max_concurrency == 1`, nodes complete in admission order;
//! - with more, only the set of completed nodes is guaranteed.
//!
//! A barrier runs once every item admitted before it has finished, with
//! nothing else running; items admitted after a barrier wait for it.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::lock;
use crate::registry::Registry;
use crate::task::outcome::panic_message;
use crate::task::{TaskContext, TaskEnv, TaskId, TaskNode};

/// Callback run by [`TaskQueue::add_barrier`].
pub type Barrier = Box<dyn FnOnce() + Send + 'static>;

enum QueueItem {
    Task(TaskNode),
    Barrier(Barrier),
}

struct QueueState {
    backlog: VecDeque<QueueItem>,
    running: HashMap<TaskId, TaskNode>,
    max_concurrency: usize,
    /// A barrier callback is executing; nothing may be promoted.
    barrier_active: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    env: TaskEnv,
}

/// What a single promotion round decided to do, outside the lock.
enum Promotion {
    Start(TaskNode),
    RunBarrier(Barrier),
}

#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(1)
    }
}

impl TaskQueue {
    /// Queue with the given maximum concurrency (clamped to at least 1) and
    /// an empty registry.
    pub fn new(max_concurrency: usize) -> Self {
        Self::with_env(max_concurrency, TaskEnv::default())
    }

    /// Queue whose nodes resolve dependencies from `registry`.
    pub fn with_registry(max_concurrency: usize, registry: Arc<Registry>) -> Self {
        Self::with_env(max_concurrency, TaskEnv::new(registry, Default::default()))
    }

    pub fn with_env(max_concurrency: usize, env: TaskEnv) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    backlog: VecDeque::new(),
                    running: HashMap::new(),
                    max_concurrency: max_concurrency.max(1),
                    barrier_active: false,
                }),
                env,
            }),
        }
    }

    pub fn env(&self) -> &TaskEnv {
        &self.shared.env
    }

    pub fn max_concurrency(&self) -> usize {
        lock(&self.shared.state).max_concurrency
    }

    /// Change the limit. Running nodes are not affected; the new value
    /// applies to future promotions.
    pub fn set_max_concurrency(&self, max_concurrency: usize) {
        {
            let mut state = lock(&self.shared.state);
            state.max_concurrency = max_concurrency.max(1);
            debug!(max = state.max_concurrency, "queue max concurrency changed");
        }
        self.pump();
    }

    /// Number of nodes currently running.
    pub fn running(&self) -> usize {
        lock(&self.shared.state).running.len()
    }

    /// Number of admitted items (nodes and barriers) not yet started.
    pub fn backlog_len(&self) -> usize {
        lock(&self.shared.state).backlog.len()
    }

    pub fn is_idle(&self) -> bool {
        let state = lock(&self.shared.state);
        state.backlog.is_empty() && state.running.is_empty() && !state.barrier_active
    }

    /// Admit `node` at the back of the backlog.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add(&self, node: TaskNode) {
        {
            let mut state = lock(&self.shared.state);
            debug!(
                task = %node.name(),
                id = %node.id(),
                backlog = state.backlog.len(),
                running = state.running.len(),
                "admitting task"
            );
            state.backlog.push_back(QueueItem::Task(node));
        }
        self.pump();
    }

    /// Admit `node` once `delay` has elapsed.
    pub fn schedule(&self, delay: Duration, node: TaskNode) {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(node);
        });
    }

    /// Run `barrier` after every item admitted so far has finished.
    pub fn add_barrier<F>(&self, barrier: F)
    where
        F: FnOnce() + Send + 'static,
    {
        lock(&self.shared.state)
            .backlog
            .push_back(QueueItem::Barrier(Box::new(barrier)));
        self.pump();
    }

    /// Wait until every item admitted so far has finished.
    pub async fn barrier(&self) {
        let (tx, rx) = oneshot::channel::<()>();
        self.add_barrier(move || {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }

    /// Cancel every backlog and running node.
    ///
    /// Canceled backlog nodes complete without running their body when their
    /// turn comes; running nodes observe the request cooperatively.
    pub fn cancel_all(&self) {
        let nodes: Vec<TaskNode> = {
            let state = lock(&self.shared.state);
            state
                .backlog
                .iter()
                .filter_map(|item| match item {
                    QueueItem::Task(node) => Some(node.clone()),
                    QueueItem::Barrier(_) => None,
                })
                .chain(state.running.values().cloned())
                .collect()
        };

        debug!(count = nodes.len(), "canceling all queued and running tasks");
        for node in nodes {
            node.cancel();
        }
    }

    /// Promote backlog items while capacity allows.
    fn pump(&self) {
        loop {
            let promotion = {
                let mut state = lock(&self.shared.state);
                if state.barrier_active {
                    return;
                }

                match state.backlog.front() {
                    None => return,
                    Some(QueueItem::Barrier(_)) => {
                        if !state.running.is_empty() {
                            return;
                        }
                        match state.backlog.pop_front() {
                            Some(QueueItem::Barrier(barrier)) => {
                                state.barrier_active = true;
                                Promotion::RunBarrier(barrier)
                            }
                            _ => return,
                        }
                    }
                    Some(QueueItem::Task(node)) => {
                        if node.is_finished() {
                            // Canceled while waiting: completes without
                            // occupying a slot.
                            trace!(task = %node.name(), "dropping finished task from backlog");
                            state.backlog.pop_front();
                            continue;
                        }
                        if state.running.len() >= state.max_concurrency {
                            return;
                        }
                        match state.backlog.pop_front() {
                            Some(QueueItem::Task(node)) => {
                                state.running.insert(node.id(), node.clone());
                                Promotion::Start(node)
                            }
                            _ => return,
                        }
                    }
                }
            };

            match promotion {
                Promotion::Start(node) => self.spawn_runner(node),
                Promotion::RunBarrier(barrier) => {
                    debug!("running queue barrier");
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(barrier)) {
                        warn!(panic = %panic_message(payload.as_ref()), "queue barrier panicked");
                    }
                    lock(&self.shared.state).barrier_active = false;
                }
            }
        }
    }

    fn spawn_runner(&self, node: TaskNode) {
        let queue = self.clone();
        let ctx = TaskContext::new(node.clone(), self.shared.env.clone());

        tokio::spawn(async move {
            node.start(ctx).await;
            queue.complete(node.id());
        });
    }

    fn complete(&self, id: TaskId) {
        {
            let mut state = lock(&self.shared.state);
            state.running.remove(&id);
            trace!(
                id = %id,
                running = state.running.len(),
                backlog = state.backlog.len(),
                "task slot released"
            );
        }
        self.pump();
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("TaskQueue")
            .field("max_concurrency", &state.max_concurrency)
            .field("running", &state.running.len())
            .field("backlog", &state.backlog.len())
            .finish_non_exhaustive()
    }
}

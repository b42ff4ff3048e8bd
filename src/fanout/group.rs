// src/fanout/group.rs

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::task::outcome::panic_message;
use crate::task::TaskOutcome;

/// Concurrent fan-out over Tokio tasks.
///
/// Every spawned closure runs on the runtime right away; there is no
/// admission limit. A closure that fails or panics only affects its own
/// outcome.
pub struct TaskGroup<T> {
    set: JoinSet<(usize, TaskOutcome<T>)>,
    token: CancellationToken,
    spawned: usize,
}

impl<T: Send + 'static> Default for TaskGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new() -> Self {
        Self {
            set: JoinSet::new(),
            token: CancellationToken::new(),
            spawned: 0,
        }
    }

    /// Build a group with `build`, then wait for every closure.
    ///
    /// Outcomes come back in completion order.
    pub async fn run<B>(build: B) -> Vec<TaskOutcome<T>>
    where
        B: FnOnce(&mut TaskGroup<T>),
    {
        let mut group = TaskGroup::new();
        build(&mut group);
        group.collect().await
    }

    /// Spawn `fut` into the group. Returns its submission index.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F>(&mut self, fut: F) -> usize
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.spawn_with(move |_| fut)
    }

    /// Like [`spawn`](Self::spawn), handing the closure the group's
    /// cancellation token so it can check it cooperatively.
    pub fn spawn_with<F, Fut>(&mut self, f: F) -> usize
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let index = self.spawned;
        self.spawned += 1;

        let token = self.token.child_token();
        let run = AssertUnwindSafe(f(token.clone())).catch_unwind();

        self.set.spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => TaskOutcome::Canceled,
                res = run => match res {
                    Err(payload) => {
                        let msg = panic_message(payload.as_ref());
                        warn!(index, panic = %msg, "group task panicked");
                        TaskOutcome::Failed(anyhow::anyhow!("task panicked: {msg}"))
                    }
                    Ok(_) if token.is_cancelled() => TaskOutcome::Canceled,
                    Ok(res) => TaskOutcome::from_result(res),
                },
            };
            (index, outcome)
        });

        index
    }

    /// Cancel every closure still running.
    pub fn cancel_all(&self) {
        debug!(running = self.set.len(), "canceling task group");
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of closures not yet collected.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Next outcome in completion order, with its submission index.
    pub async fn join_next_indexed(&mut self) -> Option<(usize, TaskOutcome<T>)> {
        while let Some(joined) = self.set.join_next().await {
            match joined {
                Ok(pair) => return Some(pair),
                // Panics are caught inside the task; the only other reason is
                // a runtime shutting down, where nothing useful is left.
                Err(err) => warn!(error = %err, "group task did not complete"),
            }
        }
        None
    }

    /// Next outcome in completion order.
    pub async fn join_next(&mut self) -> Option<TaskOutcome<T>> {
        self.join_next_indexed().await.map(|(_, outcome)| outcome)
    }

    /// Wait for every closure; outcomes in completion order.
    pub async fn collect(mut self) -> Vec<TaskOutcome<T>> {
        let mut out = Vec::with_capacity(self.set.len());
        while let Some(outcome) = self.join_next().await {
            out.push(outcome);
        }
        out
    }

    /// Wait for every closure; outcomes in submission order.
    pub async fn collect_ordered(mut self) -> Vec<TaskOutcome<T>> {
        let mut out = Vec::with_capacity(self.set.len());
        while let Some(pair) = self.join_next_indexed().await {
            out.push(pair);
        }
        out.sort_by_key(|(index, _)| *index);
        out.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

impl<T> fmt::Debug for TaskGroup<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGroup")
            .field("pending", &self.set.len())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

// src/fanout/sequence.rs

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::lock;
use crate::task::outcome::panic_message;
use crate::task::TaskOutcome;

type Job<T> = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<T>> + Send>;

#[derive(Default)]
struct Flags {
    token: CancellationToken,
    done: AtomicBool,
}

struct Entry<T> {
    flags: Arc<Flags>,
    job: Mutex<Option<Job<T>>>,
}

/// Handle to one closure of a [`TaskSequence`].
#[derive(Clone)]
pub struct SequenceHandle {
    flags: Arc<Flags>,
}

impl SequenceHandle {
    /// Cancel this closure only. Idempotent.
    pub fn cancel(&self) {
        self.flags.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.token.is_cancelled()
    }

    /// Whether the closure has produced its outcome.
    pub fn is_done(&self) -> bool {
        self.flags.done.load(Ordering::Acquire)
    }
}

impl fmt::Debug for SequenceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceHandle")
            .field("cancelled", &self.is_cancelled())
            .field("done", &self.is_done())
            .finish()
    }
}

impl<T: Send + 'static> Entry<T> {
    /// Run the closure once. `None` if another consumer already took it.
    async fn execute(&self) -> Option<TaskOutcome<T>> {
        if self.flags.token.is_cancelled() {
            lock(&self.job).take();
            self.flags.done.store(true, Ordering::Release);
            return Some(TaskOutcome::Canceled);
        }

        let job = lock(&self.job).take()?;
        let mut in_flight = InFlight {
            flags: &self.flags,
            armed: true,
        };
        let token = &self.flags.token;
        let run = AssertUnwindSafe(job()).catch_unwind();

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => TaskOutcome::Canceled,
            res = run => match res {
                Err(payload) => TaskOutcome::Failed(anyhow::anyhow!(
                    "task panicked: {}",
                    panic_message(payload.as_ref())
                )),
                Ok(_) if token.is_cancelled() => TaskOutcome::Canceled,
                Ok(res) => TaskOutcome::from_result(res),
            },
        };

        in_flight.armed = false;
        self.flags.done.store(true, Ordering::Release);
        Some(outcome)
    }
}

/// Cancels an entry whose run was dropped before producing its outcome, so
/// that the next pass reports it as canceled instead of skipping it.
struct InFlight<'a> {
    flags: &'a Flags,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            trace!("sequence run dropped mid-task; marking it canceled");
            self.flags.token.cancel();
        }
    }
}

/// Ordered, lazily executed fan-out.
///
/// Closures are added up front and run one at a time, in insertion order,
/// only while the stream returned by [`results`](Self::results) is polled.
pub struct TaskSequence<T> {
    entries: Vec<Arc<Entry<T>>>,
}

impl<T> Default for TaskSequence<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Send + 'static> TaskSequence<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a closure. Nothing runs until results are pulled.
    pub fn add_task<F, Fut>(&mut self, task: F) -> SequenceHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let flags = Arc::new(Flags::default());
        let job: Job<T> = Box::new(move || task().boxed());
        self.entries.push(Arc::new(Entry {
            flags: Arc::clone(&flags),
            job: Mutex::new(Some(job)),
        }));
        SequenceHandle { flags }
    }

    /// Cancel every closure. Closures not started yet will never run; the
    /// one currently running stops at its next suspension point.
    pub fn cancel_all(&self) {
        debug!(count = self.entries.len(), "canceling task sequence");
        for entry in &self.entries {
            entry.flags.token.cancel();
        }
    }

    /// Forget closures that have produced their outcome.
    pub fn remove_done(&mut self) {
        let before = self.entries.len();
        self.entries
            .retain(|entry| !entry.flags.done.load(Ordering::Acquire));
        trace!(removed = before - self.entries.len(), "removed done tasks");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lazy, single-pass stream of outcomes, one per closure that was not
    /// done when this was called, in insertion order.
    ///
    /// Each closure runs only when the stream is polled for its item. A
    /// closure canceled beforehand yields [`TaskOutcome::Canceled`] without
    /// running. Dropping the stream while a closure is in flight cancels that
    /// closure; a later call reports it as canceled.
    pub fn results(&self) -> BoxStream<'static, TaskOutcome<T>> {
        let pending: Vec<Arc<Entry<T>>> = self
            .entries
            .iter()
            .filter(|entry| !entry.flags.done.load(Ordering::Acquire))
            .cloned()
            .collect();

        stream::iter(pending)
            .filter_map(|entry| async move { entry.execute().await })
            .boxed()
    }

    /// Run every pending closure and collect the outcomes.
    pub async fn collect_results(&self) -> Vec<TaskOutcome<T>> {
        self.results().collect().await
    }

    /// Run every pending closure and keep the successful values, in order.
    pub async fn values(&self) -> Vec<T> {
        self.results()
            .filter_map(|outcome| async move { outcome.success() })
            .collect()
            .await
    }
}

impl<T> fmt::Debug for TaskSequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSequence")
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}

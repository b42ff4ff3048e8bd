// src/gate.rs

//! Buffer external calls until startup is complete.
//!
//! A [`ReadinessGate`] starts `Pending`. Calls made while pending are queued
//! in issue order; [`open`](ReadinessGate::open) installs the items (usually
//! lifecycle plugins) and replays the queue exactly once. From then on every
//! call runs immediately. The gate never goes back to pending.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::lock;
use crate::task::outcome::panic_message;

type ForEachFn<P> = Box<dyn Fn(&P) + Send>;
type PredicateFn<P> = Box<dyn Fn(&P) -> bool + Send>;

enum BufferedCall<P> {
    ForEach(ForEachFn<P>),
    AllSatisfy(PredicateFn<P>),
}

impl<P> BufferedCall<P> {
    fn replay(self, items: &[P]) {
        match self {
            BufferedCall::ForEach(action) => items.iter().for_each(action),
            BufferedCall::AllSatisfy(predicate) => {
                let accepted = items.iter().all(predicate);
                debug!(accepted, "replayed buffered predicate");
            }
        }
    }
}

enum Phase<P> {
    Pending,
    /// `open` is replaying the buffer; new calls still go to the buffer.
    Draining(Arc<[P]>),
    Ready(Arc<[P]>),
}

struct Inner<P> {
    phase: Phase<P>,
    buffer: VecDeque<BufferedCall<P>>,
}

impl<P> Inner<P> {
    fn ready_items(&self) -> Option<Arc<[P]>> {
        match &self.phase {
            Phase::Ready(items) => Some(Arc::clone(items)),
            Phase::Pending | Phase::Draining(_) => None,
        }
    }
}

pub struct ReadinessGate<P> {
    inner: Mutex<Inner<P>>,
    ready: watch::Sender<bool>,
}

impl<P> Default for ReadinessGate<P> {
    fn default() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner {
                phase: Phase::Pending,
                buffer: VecDeque::new(),
            }),
            ready,
        }
    }
}

impl<P> ReadinessGate<P>
where
    P: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` on every item.
    ///
    /// While pending the call is queued and this returns immediately.
    pub fn for_each<F>(&self, action: F)
    where
        F: Fn(&P) + Send + 'static,
    {
        let items = {
            let mut inner = lock(&self.inner);
            match inner.ready_items() {
                Some(items) => items,
                None => {
                    inner.buffer.push_back(BufferedCall::ForEach(Box::new(action)));
                    return;
                }
            }
        };
        items.iter().for_each(action);
    }

    /// Whether every item satisfies `predicate`.
    ///
    /// While pending the predicate is queued (its result is discarded on
    /// replay) and this returns `true`.
    pub fn all_satisfy<F>(&self, predicate: F) -> bool
    where
        F: Fn(&P) -> bool + Send + 'static,
    {
        let items = {
            let mut inner = lock(&self.inner);
            match inner.ready_items() {
                Some(items) => items,
                None => {
                    inner
                        .buffer
                        .push_back(BufferedCall::AllSatisfy(Box::new(predicate)));
                    return true;
                }
            }
        };
        items.iter().all(predicate)
    }

    /// Fold over the items. `None` while not ready; never buffered.
    pub fn fold<R, F>(&self, init: R, f: F) -> Option<R>
    where
        F: FnMut(R, &P) -> R,
    {
        let items = lock(&self.inner).ready_items()?;
        Some(items.iter().fold(init, f))
    }

    /// Install `items` and replay every buffered call in issue order.
    ///
    /// Calls arriving during the replay are appended to the same buffer and
    /// replayed after the ones already queued; the gate reports ready only
    /// once the buffer is empty. Buffered closures run without the internal
    /// lock held; a panic in one of them is logged and the replay goes on.
    /// Returns `false` (and does nothing) if the gate was already opened.
    pub fn open(&self, items: Vec<P>) -> bool {
        let items: Arc<[P]> = items.into();
        {
            let mut inner = lock(&self.inner);
            if !matches!(inner.phase, Phase::Pending) {
                warn!("readiness gate opened twice; ignoring");
                return false;
            }
            inner.phase = Phase::Draining(Arc::clone(&items));
        }

        let mut replayed = 0usize;
        loop {
            let batch: Vec<BufferedCall<P>> = {
                let mut inner = lock(&self.inner);
                if inner.buffer.is_empty() {
                    inner.phase = Phase::Ready(Arc::clone(&items));
                    break;
                }
                inner.buffer.drain(..).collect()
            };

            replayed += batch.len();
            for call in batch {
                // One panicking call must not wedge the gate in `Draining`.
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| call.replay(&items))) {
                    warn!(panic = %panic_message(payload.as_ref()), "buffered call panicked during replay");
                }
            }
        }

        self.ready.send_replace(true);
        info!(items = items.len(), replayed, "readiness gate open");
        true
    }

    pub fn is_ready(&self) -> bool {
        matches!(lock(&self.inner).phase, Phase::Ready(_))
    }

    /// Resolves once [`open`](Self::open) has finished replaying.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Number of calls waiting for the gate to open.
    pub fn buffered_len(&self) -> usize {
        lock(&self.inner).buffer.len()
    }
}

impl<P> fmt::Debug for ReadinessGate<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        let phase = match inner.phase {
            Phase::Pending => "pending",
            Phase::Draining(_) => "draining",
            Phase::Ready(_) => "ready",
        };
        f.debug_struct("ReadinessGate")
            .field("phase", &phase)
            .field("buffered", &inner.buffer.len())
            .finish()
    }
}

// src/dispatch.rs

//! Execution-context seam used by tasks.
//!
//! Tasks ask a [`Dispatcher`] to run callbacks on the primary context (the
//! serialized context UI-bound work needs) or in the background. Production
//! code uses [`TokioDispatcher`]; tests can inject [`InlineDispatcher`],
//! which runs every callback synchronously on the caller.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::errors::{BootError, Result};

/// A callback handed to a dispatcher.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

pub trait Dispatcher: Send + Sync {
    /// Run `action` on the primary context, after everything already queued
    /// there.
    fn run_on_primary(&self, action: Action);

    /// Run `action` on the primary context once `delay` has elapsed.
    fn run_on_primary_after(&self, delay: Duration, action: Action);

    /// Run `action` on a background worker.
    fn run_on_background(&self, action: Action);
}

/// Mutual exclusion for everything bound to the primary context.
///
/// Primary dispatcher callbacks hold the lane while they run.
/// `Affinity::Primary` task bodies hold it only while they are being polled,
/// so a body suspended at an `.await` leaves the lane free for callbacks,
/// including ones it queued itself.
#[derive(Debug, Clone, Default)]
pub struct PrimaryLane(Arc<Mutex<()>>);

impl PrimaryLane {
    pub async fn enter(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.0).lock_owned().await
    }

    /// Wrap `fut` so that every poll of it happens while holding the lane.
    pub fn run<F>(&self, fut: F) -> OnPrimaryLane<F>
    where
        F: Future + Unpin,
    {
        OnPrimaryLane {
            lane: Arc::clone(&self.0),
            acquire: None,
            inner: fut,
        }
    }
}

/// Future returned by [`PrimaryLane::run`].
pub struct OnPrimaryLane<F> {
    lane: Arc<Mutex<()>>,
    acquire: Option<BoxFuture<'static, OwnedMutexGuard<()>>>,
    inner: F,
}

impl<F> Future for OnPrimaryLane<F>
where
    F: Future + Unpin,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        let this = self.get_mut();
        let lane = &this.lane;
        let acquire = this
            .acquire
            .get_or_insert_with(|| Arc::clone(lane).lock_owned().boxed());

        let guard = ready!(acquire.as_mut().poll(cx));
        this.acquire = None;

        let res = Pin::new(&mut this.inner).poll(cx);
        drop(guard);
        res
    }
}

/// Dispatcher backed by the Tokio runtime.
///
/// The primary context is a single task draining a channel, so primary
/// callbacks run one at a time and in submission order. Background callbacks
/// go to the blocking pool.
#[derive(Debug, Clone)]
pub struct TokioDispatcher {
    primary_tx: mpsc::UnboundedSender<Action>,
    handle: Handle,
}

impl TokioDispatcher {
    /// Create the dispatcher and spawn its primary context.
    ///
    /// Fails when called outside of a Tokio runtime.
    pub fn new(lane: PrimaryLane) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| {
            BootError::ConfigError(format!("TokioDispatcher needs a Tokio runtime: {e}"))
        })?;

        let (primary_tx, mut primary_rx) = mpsc::unbounded_channel::<Action>();

        handle.spawn(async move {
            debug!("primary context started");
            while let Some(action) = primary_rx.recv().await {
                let _guard = lane.enter().await;
                if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(action)) {
                    let msg = crate::task::outcome::panic_message(payload.as_ref());
                    warn!(panic = %msg, "primary callback panicked");
                }
            }
            debug!("primary context finished (all dispatchers dropped)");
        });

        Ok(Self { primary_tx, handle })
    }
}

impl Dispatcher for TokioDispatcher {
    fn run_on_primary(&self, action: Action) {
        if self.primary_tx.send(action).is_err() {
            warn!("primary context is gone; dropping callback");
        }
    }

    fn run_on_primary_after(&self, delay: Duration, action: Action) {
        let tx = self.primary_tx.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(action).is_err() {
                warn!("primary context is gone; dropping delayed callback");
            }
        });
    }

    fn run_on_background(&self, action: Action) {
        // Fire and forget; the handle is not needed.
        drop(self.handle.spawn_blocking(action));
    }
}

/// Runs every callback immediately on the calling thread, ignoring delays.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn run_on_primary(&self, action: Action) {
        action();
    }

    fn run_on_primary_after(&self, _delay: Duration, action: Action) {
        action();
    }

    fn run_on_background(&self, action: Action) {
        action();
    }
}

// src/engine/builder.rs

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::dag::DependencyGraph;
use crate::dispatch::{Dispatcher, PrimaryLane, TokioDispatcher};
use crate::engine::handle::EngineHandle;
use crate::engine::runtime::GraphRunner;
use crate::errors::{BootError, Result};
use crate::gate::ReadinessGate;
use crate::plugin::LifecyclePlugin;
use crate::provider::{CoreServices, ServiceProvider};
use crate::queue::TaskQueue;
use crate::registry::Registry;
use crate::task::outcome::panic_message;
use crate::task::{TaskEnv, TaskNode};

type ReadyCallback = Box<dyn FnOnce() + Send + 'static>;

/// Composes an engine from providers.
///
/// Defaults: a fresh registry, `max_concurrency` 1 and a
/// [`TokioDispatcher`].
pub struct EngineBuilder {
    registry: Option<Arc<Registry>>,
    max_concurrency: usize,
    providers: Vec<Arc<dyn ServiceProvider>>,
    on_ready: Option<ReadyCallback>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            registry: None,
            max_concurrency: 1,
            providers: Vec::new(),
            on_ready: None,
            dispatcher: None,
        }
    }
}

impl EngineBuilder {
    /// Use an existing registry, e.g. one a test pre-filled with stubs.
    /// Provider modules are still added to it.
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn provider(mut self, provider: impl ServiceProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = Arc<dyn ServiceProvider>>) -> Self {
        self.providers.extend(providers);
        self
    }

    /// Called once every task has finished, right before the readiness gate
    /// opens.
    pub fn on_ready<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_ready = Some(Box::new(callback));
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Register modules, build the task graph and start draining it.
    ///
    /// Returns once the graph is validated; tasks run in the background.
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> Result<EngineHandle> {
        let runtime = Handle::try_current().map_err(|e| {
            BootError::ConfigError(format!("the engine needs a Tokio runtime: {e}"))
        })?;

        let registry = self.registry.unwrap_or_default();
        let lane = PrimaryLane::default();

        let dispatcher: Arc<dyn Dispatcher> = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => Arc::new(TokioDispatcher::new(lane.clone())?),
        };

        registry.add(CoreServices::new(Arc::clone(&dispatcher)).modules());
        for provider in &self.providers {
            registry.add(provider.modules());
        }

        let tasks: Vec<TaskNode> = self
            .providers
            .iter()
            .flat_map(|provider| provider.operations())
            .collect();
        let plugins: Vec<Arc<dyn LifecyclePlugin>> = self
            .providers
            .iter()
            .flat_map(|provider| provider.plugins())
            .collect();

        debug!(
            providers = self.providers.len(),
            registrations = registry.len(),
            tasks = tasks.len(),
            plugins = plugins.len(),
            "engine composed"
        );

        let graph = DependencyGraph::new(tasks.iter().cloned())?;
        let queue = TaskQueue::with_env(
            self.max_concurrency,
            TaskEnv::new(Arc::clone(&registry), lane),
        );
        let gate = Arc::new(ReadinessGate::new());

        let runner = GraphRunner::new(graph, queue.clone());
        let on_ready = self.on_ready;
        let barrier_gate = Arc::clone(&gate);

        info!(
            tasks = tasks.len(),
            max = queue.max_concurrency(),
            "engine starting"
        );

        let join = runtime.spawn(runner.run(move || {
            if let Some(callback) = on_ready {
                // The gate opens even if the callback panics.
                if let Err(payload) = catch_unwind(AssertUnwindSafe(callback)) {
                    warn!(panic = %panic_message(payload.as_ref()), "on_ready callback panicked");
                }
            }
            barrier_gate.open(plugins);
        }));

        Ok(EngineHandle::new(registry, dispatcher, queue, tasks, gate, join))
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("max_concurrency", &self.max_concurrency)
            .field("providers", &self.providers.len())
            .field("on_ready", &self.on_ready.is_some())
            .finish_non_exhaustive()
    }
}

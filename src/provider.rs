// src/provider.rs

//! Service providers: the unit a composition root hands to the engine.
//!
//! A provider contributes registry entries, startup tasks and lifecycle
//! plugins. The engine calls each method exactly once while starting.

use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::plugin::LifecyclePlugin;
use crate::registry::RegistryEntry;
use crate::task::TaskNode;
use crate::types::StoragePolicy;

pub trait ServiceProvider: Send + Sync {
    /// Registrations to add before any task runs. Later providers override
    /// earlier ones for the same type.
    fn modules(&self) -> Vec<RegistryEntry> {
        Vec::new()
    }

    /// Startup tasks, already wired with their dependencies. Dependencies
    /// may point at tasks of other providers.
    fn operations(&self) -> Vec<TaskNode> {
        Vec::new()
    }

    fn plugins(&self) -> Vec<Arc<dyn LifecyclePlugin>> {
        Vec::new()
    }
}

/// Registrations every engine carries, added before any other provider.
///
/// Currently only the dispatcher, as `Arc<dyn Dispatcher>`.
pub struct CoreServices {
    dispatcher: Arc<dyn Dispatcher>,
}

impl CoreServices {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl ServiceProvider for CoreServices {
    fn modules(&self) -> Vec<RegistryEntry> {
        let dispatcher = Arc::clone(&self.dispatcher);
        vec![RegistryEntry::new::<Arc<dyn Dispatcher>, _>(
            StoragePolicy::Unique,
            move || Arc::clone(&dispatcher),
        )]
    }
}

// src/registry/mod.rs

//! Typed factory/instance lookup used for dependency resolution.
//!
//! - [`entry`] defines [`RegistryEntry`], one `(type, policy, factory)`
//!   registration.
//! - [`inject`] provides [`Inject`], a lazily resolved handle.
//!
//! There is no process-wide registry: the composition root creates one and
//! shares it as `Arc<Registry>`. Registrations can be replaced at any time,
//! which is how tests swap implementations for stubs.

pub mod entry;
pub mod inject;

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, error};

use crate::errors::{BootError, Result};
use crate::lock;
use crate::types::StoragePolicy;

pub use entry::RegistryEntry;
pub use inject::Inject;

use entry::Dynamic;

/// A registration plus the cache for its unique instance.
///
/// The cache belongs to the slot, so re-registering a type also forgets the
/// instance the previous factory produced.
struct Slot {
    entry: RegistryEntry,
    unique: Arc<OnceLock<Dynamic>>,
}

#[derive(Default)]
pub struct Registry {
    slots: Mutex<HashMap<TypeId, Slot>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `T`.
    pub fn register<T, F>(&self, policy: StoragePolicy, factory: F)
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.insert(RegistryEntry::new::<T, F>(policy, factory));
    }

    /// Register a batch of entries in order; later entries for the same
    /// type win.
    pub fn add(&self, entries: impl IntoIterator<Item = RegistryEntry>) {
        for entry in entries {
            self.insert(entry);
        }
    }

    fn insert(&self, entry: RegistryEntry) {
        let name = entry.refl_name;
        let policy = entry.policy;
        let replaced = lock(&self.slots)
            .insert(
                entry.refl_type,
                Slot {
                    entry,
                    unique: Arc::new(OnceLock::new()),
                },
            )
            .is_some();

        debug!(type_name = name, ?policy, replaced, "registered dependency");
    }

    pub fn contains<T: 'static>(&self) -> bool {
        lock(&self.slots).contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `T`, reporting a missing registration as an error.
    ///
    /// The factory runs outside the registry lock, so factories may resolve
    /// their own dependencies. A `Unique` factory runs at most once even when
    /// several threads resolve the type for the first time concurrently.
    pub fn try_resolve<T>(&self) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let (factory, policy, unique) = {
            let slots = lock(&self.slots);
            let slot = slots
                .get(&TypeId::of::<T>())
                .ok_or(BootError::Unregistered(type_name::<T>()))?;
            (
                Arc::clone(&slot.entry.factory),
                slot.entry.policy,
                Arc::clone(&slot.unique),
            )
        };

        let instance = match policy {
            StoragePolicy::New => factory(),
            StoragePolicy::Unique => Arc::clone(unique.get_or_init(|| factory())),
        };

        instance.downcast_ref::<T>().cloned().ok_or_else(|| {
            BootError::ConfigError(format!(
                "factory registered for '{}' produced another type",
                type_name::<T>()
            ))
        })
    }

    /// Resolve `T`.
    ///
    /// # Panics
    ///
    /// A missing registration is a wiring bug, not a runtime condition: this
    /// panics with the name of the missing type. Use
    /// [`try_resolve`](Self::try_resolve) to check first.
    pub fn resolve<T>(&self) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        match self.try_resolve::<T>() {
            Ok(value) => value,
            Err(err) => {
                error!(type_name = type_name::<T>(), error = %err, "dependency not resolved");
                panic!("dependency '{}' not resolved: {err}", type_name::<T>());
            }
        }
    }

    /// Drop every registration and cached instance.
    pub fn remove_all(&self) {
        lock(&self.slots).clear();
        debug!("registry cleared");
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = lock(&self.slots);
        let mut names: Vec<&str> = slots.values().map(|s| s.entry.refl_name).collect();
        names.sort_unstable();
        f.debug_struct("Registry").field("types", &names).finish()
    }
}

// src/registry/inject.rs

use std::fmt;
use std::sync::{Arc, OnceLock};

use super::Registry;

/// Lazily resolved dependency.
///
/// Nothing is resolved until the first [`get`](Inject::get); the resolved
/// value is then kept for the lifetime of the handle, whatever the storage
/// policy of the registration.
pub struct Inject<T> {
    registry: Arc<Registry>,
    value: OnceLock<T>,
}

impl<T> Inject<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            value: OnceLock::new(),
        }
    }

    /// Resolve on first use. Panics like [`Registry::resolve`] when `T` was
    /// never registered.
    pub fn get(&self) -> &T {
        self.value.get_or_init(|| self.registry.resolve::<T>())
    }

    pub fn is_resolved(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T> fmt::Debug for Inject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inject")
            .field("type", &std::any::type_name::<T>())
            .field("resolved", &self.value.get().is_some())
            .finish()
    }
}

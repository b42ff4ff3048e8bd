// src/registry/entry.rs

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::types::StoragePolicy;

pub(crate) type Dynamic = Arc<dyn Any + Send + Sync>;
pub(crate) type Factory = Arc<dyn Fn() -> Dynamic + Send + Sync>;

/// One registration: a type key, its storage policy and its factory.
///
/// The key is the `TypeId` of `T`, so resolution is by exact type. To
/// register an implementation behind a trait, register the trait object
/// type, e.g. `Arc<dyn Reader>`.
#[derive(Clone)]
pub struct RegistryEntry {
    pub(crate) refl_type: TypeId,
    pub(crate) refl_name: &'static str,
    pub(crate) policy: StoragePolicy,
    pub(crate) factory: Factory,
}

impl RegistryEntry {
    pub fn new<T, F>(policy: StoragePolicy, factory: F) -> Self
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            refl_type: TypeId::of::<T>(),
            refl_name: type_name::<T>(),
            policy,
            factory: Arc::new(move || Arc::new(factory()) as Dynamic),
        }
    }

    /// Name of the registered type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.refl_name
    }

    pub fn policy(&self) -> StoragePolicy {
        self.policy
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("type", &self.refl_name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

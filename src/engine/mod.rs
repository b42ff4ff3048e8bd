// src/engine/mod.rs

//! Startup engine.
//!
//! This module ties together:
//! - the registry, filled from every provider's modules
//! - the dependency graph of every provider's operations
//! - the bounded queue the graph drains through
//! - the readiness gate in front of the lifecycle plugins
//!
//! [`builder`] composes an engine and starts it, [`handle`] is what the
//! composition root keeps afterwards, and [`runtime`] is the async shell
//! driving the pure [`Scheduler`](crate::dag::Scheduler).

pub mod builder;
pub mod handle;
pub mod runtime;

pub use builder::EngineBuilder;
pub use handle::EngineHandle;
pub use runtime::{GraphRunner, RunnerEvent};

/// Entry point for composing an engine.
#[derive(Debug, Clone, Copy)]
pub struct Engine;

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

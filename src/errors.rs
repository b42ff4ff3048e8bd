// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("task '{task}' depends on '{dependency}', which is not part of the graph")]
    UnknownDependency { task: String, dependency: String },

    #[error("cannot add a dependency to task '{0}' once it has started")]
    DependencyAfterStart(String),

    #[error("dependency '{0}' is not registered")]
    Unregistered(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BootError>;

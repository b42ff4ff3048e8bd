// src/config/mod.rs

//! Configuration for the demo binary's simulated startup graph.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Parse duration strings such as `"250ms"` (`duration.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants like graph acyclicity (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigFile, EngineSection, RawConfigFile, TaskConfig};

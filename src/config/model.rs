// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::config::duration::parse_duration;
use crate::types::Affinity;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [engine]
/// max_concurrency = 2
///
/// [task.storage]
/// duration = "150ms"
///
/// [task.window]
/// duration = "50ms"
/// after = ["storage"]
/// affinity = "primary"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Engine settings from `[engine]`.
    #[serde(default)]
    pub engine: EngineSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A validated configuration.
///
/// Obtained through `ConfigFile::try_from(raw)` (see `validate.rs`), which
/// guarantees known dependencies, parseable durations and no cycles.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    /// Build without validating. Callers are expected to have validated the
    /// parts already.
    pub fn new_unchecked(engine: EngineSection, task: BTreeMap<String, TaskConfig>) -> Self {
        Self { engine, task }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Maximum number of tasks running at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    1
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// `[task.<name>]` section: one simulated startup step.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// How long the step pretends to work, e.g. `"200ms"`.
    #[serde(default)]
    pub duration: Option<String>,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Ordering hint among tasks that become ready together.
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub affinity: Affinity,

    /// Make the step fail once its work is done.
    #[serde(default)]
    pub fail: bool,
}

impl TaskConfig {
    /// Simulated work time; zero when unset.
    pub fn work_duration(&self) -> Result<Duration, String> {
        match self.duration.as_deref() {
            Some(s) => parse_duration(s),
            None => Ok(Duration::ZERO),
        }
    }
}

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use bootdag::config::{ConfigFile, EngineSection, RawConfigFile, TaskConfig};
use bootdag::task::TaskNode;
use bootdag::types::Affinity;

use crate::recorder::Recorder;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                engine: EngineSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.config.engine.max_concurrency = max;
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    /// The raw, unvalidated model (for validation tests).
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
#[derive(Default)]
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duration(mut self, duration: &str) -> Self {
        self.task.duration = Some(duration.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn affinity(mut self, affinity: Affinity) -> Self {
        self.task.affinity = affinity;
        self
    }

    pub fn fail(mut self) -> Self {
        self.task.fail = true;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// A node that records its name when it runs.
pub fn recording_node(name: &str, log: &Recorder<String>) -> TaskNode {
    sleeping_node(name, Duration::ZERO, log)
}

/// A node that sleeps (cooperatively) for `duration`, then records its name.
pub fn sleeping_node(name: &str, duration: Duration, log: &Recorder<String>) -> TaskNode {
    let log = log.clone();
    TaskNode::new(name, move |ctx| async move {
        ctx.sleep(duration).await?;
        log.push(ctx.name().to_string());
        anyhow::Ok(())
    })
}

/// A node that records its name and then fails.
pub fn failing_node(name: &str, log: &Recorder<String>) -> TaskNode {
    let log = log.clone();
    TaskNode::new(name, move |ctx| async move {
        log.push(ctx.name().to_string());
        Err::<(), _>(anyhow::anyhow!("{} failed on purpose", ctx.name()))
    })
}

/// Make `node` depend on every node in `deps`.
pub fn wire(node: &TaskNode, deps: &[&TaskNode]) {
    for dep in deps {
        node.add_dependency(dep).expect("dependency can be added");
    }
}

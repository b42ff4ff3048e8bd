// src/sim.rs

//! Simulated startup workload used by the `bootdag` binary.
//!
//! Every `[task.<name>]` of the config becomes a [`TaskNode`] that sleeps
//! for its `duration`, optionally fails, and records its name in the
//! [`CompletionLog`] resolved from the registry.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::config::ConfigFile;
use crate::errors::{BootError, Result};
use crate::lock;
use crate::plugin::{HandlerTable, LifecycleEventKind, LifecyclePlugin};
use crate::provider::ServiceProvider;
use crate::registry::RegistryEntry;
use crate::task::TaskNode;
use crate::types::StoragePolicy;

/// Names of successfully completed tasks, in completion order.
#[derive(Debug, Clone, Default)]
pub struct CompletionLog(Arc<Mutex<Vec<String>>>);

impl CompletionLog {
    pub fn record(&self, name: &str) {
        lock(&self.0).push(name.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }
}

/// Provider turning a validated [`ConfigFile`] into startup tasks.
///
/// `[task.*]` tables are read into a sorted map, so equal-priority siblings
/// are admitted in task-name order; set `priority` to order them otherwise.
pub struct SimulatedServices {
    nodes: Vec<TaskNode>,
    log: CompletionLog,
}

impl SimulatedServices {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let mut by_name: BTreeMap<&str, TaskNode> = BTreeMap::new();

        for (name, task) in cfg.task.iter() {
            let duration = task.work_duration().map_err(|e| {
                BootError::ConfigError(format!("task '{name}' has an invalid `duration`: {e}"))
            })?;
            let fail = task.fail;

            let node = TaskNode::builder(name.as_str())
                .priority(task.priority)
                .affinity(task.affinity)
                .body(move |ctx| async move {
                    ctx.sleep(duration).await?;
                    if fail {
                        anyhow::bail!("simulated failure in '{}'", ctx.name());
                    }
                    ctx.resolve::<CompletionLog>().record(ctx.name());
                    anyhow::Ok(())
                });
            by_name.insert(name.as_str(), node);
        }

        for (name, task) in cfg.task.iter() {
            let node = &by_name[name.as_str()];
            for dep in task.after.iter() {
                let dep_node = by_name.get(dep.as_str()).ok_or_else(|| {
                    BootError::UnknownDependency {
                        task: name.clone(),
                        dependency: dep.clone(),
                    }
                })?;
                node.add_dependency(dep_node)?;
            }
        }

        Ok(Self {
            nodes: by_name.into_values().collect(),
            log: CompletionLog::default(),
        })
    }

    pub fn log(&self) -> CompletionLog {
        self.log.clone()
    }
}

impl ServiceProvider for SimulatedServices {
    fn modules(&self) -> Vec<RegistryEntry> {
        let log = self.log.clone();
        vec![RegistryEntry::new::<CompletionLog, _>(
            StoragePolicy::Unique,
            move || log.clone(),
        )]
    }

    fn operations(&self) -> Vec<TaskNode> {
        self.nodes.clone()
    }

    fn plugins(&self) -> Vec<Arc<dyn LifecyclePlugin>> {
        let logger = HandlerTable::new("logger")
            .on(LifecycleEventKind::DidFinishLaunching, |event| {
                info!(%event, "launch event delivered");
                true
            })
            .on(LifecycleEventKind::WillTerminate, |event| {
                info!(%event, "terminate event delivered");
                true
            });
        vec![Arc::new(logger)]
    }
}

// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::graph::detect_cycle;
use crate::errors::{BootError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = BootError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.engine, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_engine_section(cfg)?;
    validate_task_fields(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(BootError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.engine.max_concurrency == 0 {
        return Err(BootError::ConfigError(
            "[engine].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_fields(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        task.work_duration().map_err(|e| {
            BootError::ConfigError(format!("task '{name}' has an invalid `duration`: {e}"))
        })?;
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(BootError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(BootError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task. For `[task.B] after = ["A"]` we add A -> B.
    let nodes = cfg.task.keys().map(String::as_str);
    let edges = cfg.task.iter().flat_map(|(name, task)| {
        task.after
            .iter()
            .map(move |dep| (dep.as_str(), name.as_str()))
    });

    match detect_cycle(nodes, edges) {
        None => Ok(()),
        Some(node) => Err(BootError::DagCycle(format!(
            "cycle detected in task graph involving task '{}'",
            node
        ))),
    }
}

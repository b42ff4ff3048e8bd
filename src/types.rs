// src/types.rs

use std::str::FromStr;

use serde::Deserialize;

/// Where a task body must execute.
///
/// - `Any`: any worker of the runtime pool (default).
/// - `Primary`: each poll of the body is serialized with all other
///   primary-context work (the dispatcher's primary callbacks and every other
///   `Primary` task). Between polls the lane is free. This is the capability
///   a UI-bound startup step asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Affinity {
    Any,
    Primary,
}

impl Default for Affinity {
    fn default() -> Self {
        Affinity::Any
    }
}

impl FromStr for Affinity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any" => Ok(Affinity::Any),
            "primary" => Ok(Affinity::Primary),
            other => Err(format!(
                "invalid affinity: {other} (expected \"any\" or \"primary\")"
            )),
        }
    }
}

/// How the registry stores instances produced by a factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoragePolicy {
    /// Call the factory on every resolution.
    New,
    /// Call the factory at most once and hand out the cached instance.
    Unique,
}

impl Default for StoragePolicy {
    fn default() -> Self {
        StoragePolicy::New
    }
}

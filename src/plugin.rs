// src/plugin.rs

//! Lifecycle plugins: collaborators notified of process lifecycle events.
//!
//! The engine forwards events to plugins through its readiness gate, so a
//! plugin never sees an event before startup has finished.

use std::collections::HashMap;
use std::fmt;

/// Discriminant of a [`LifecycleEvent`], used to ask a plugin whether it
/// cares about an event before building the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEventKind {
    DidFinishLaunching,
    WillEnterForeground,
    DidEnterBackground,
    WillTerminate,
    SceneWillConnect,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    DidFinishLaunching,
    WillEnterForeground,
    DidEnterBackground,
    WillTerminate,
    SceneWillConnect { scene: String },
    Custom { name: String, payload: Option<String> },
}

impl LifecycleEvent {
    pub fn kind(&self) -> LifecycleEventKind {
        match self {
            LifecycleEvent::DidFinishLaunching => LifecycleEventKind::DidFinishLaunching,
            LifecycleEvent::WillEnterForeground => LifecycleEventKind::WillEnterForeground,
            LifecycleEvent::DidEnterBackground => LifecycleEventKind::DidEnterBackground,
            LifecycleEvent::WillTerminate => LifecycleEventKind::WillTerminate,
            LifecycleEvent::SceneWillConnect { .. } => LifecycleEventKind::SceneWillConnect,
            LifecycleEvent::Custom { .. } => LifecycleEventKind::Custom,
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::SceneWillConnect { scene } => write!(f, "SceneWillConnect({scene})"),
            LifecycleEvent::Custom { name, .. } => write!(f, "Custom({name})"),
            other => write!(f, "{:?}", other.kind()),
        }
    }
}

pub trait LifecyclePlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this plugin has a handler for `kind`. Plugins that do not
    /// handle an event are skipped when it is forwarded.
    fn handles(&self, kind: LifecycleEventKind) -> bool;

    /// Handle `event`. The return value is the plugin's answer for events
    /// that ask a question (e.g. whether launching may proceed); `true`
    /// otherwise.
    fn handle(&self, event: &LifecycleEvent) -> bool;
}

type Handler = Box<dyn Fn(&LifecycleEvent) -> bool + Send + Sync>;

/// A plugin assembled from an explicit table of optional handlers.
///
/// ```
/// use bootdag::plugin::{HandlerTable, LifecycleEventKind, LifecyclePlugin};
///
/// let plugin = HandlerTable::new("analytics")
///     .on(LifecycleEventKind::DidFinishLaunching, |_| true);
/// assert!(plugin.handles(LifecycleEventKind::DidFinishLaunching));
/// assert!(!plugin.handles(LifecycleEventKind::WillTerminate));
/// ```
pub struct HandlerTable {
    name: String,
    handlers: HashMap<LifecycleEventKind, Handler>,
}

impl HandlerTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: HashMap::new(),
        }
    }

    /// Install (or replace) the handler for `kind`.
    pub fn on<F>(mut self, kind: LifecycleEventKind, handler: F) -> Self
    where
        F: Fn(&LifecycleEvent) -> bool + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
        self
    }
}

impl LifecyclePlugin for HandlerTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, kind: LifecycleEventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    fn handle(&self, event: &LifecycleEvent) -> bool {
        self.handlers
            .get(&event.kind())
            .map(|handler| handler(event))
            .unwrap_or(true)
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<String> = self.handlers.keys().map(|k| format!("{k:?}")).collect();
        kinds.sort();
        f.debug_struct("HandlerTable")
            .field("name", &self.name)
            .field("handles", &kinds)
            .finish()
    }
}

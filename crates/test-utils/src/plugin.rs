use bootdag::plugin::{LifecycleEvent, LifecycleEventKind, LifecyclePlugin};

use crate::recorder::Recorder;

/// Plugin that handles every event, records `"<name>:<event>"` and answers
/// with a fixed value.
#[derive(Debug, Clone)]
pub struct RecordingPlugin {
    name: String,
    events: Recorder<String>,
    answer: bool,
}

impl RecordingPlugin {
    pub fn new(name: &str, events: &Recorder<String>) -> Self {
        Self {
            name: name.to_string(),
            events: events.clone(),
            answer: true,
        }
    }

    /// Answer `false` to every event.
    pub fn objecting(mut self) -> Self {
        self.answer = false;
        self
    }
}

impl LifecyclePlugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, _kind: LifecycleEventKind) -> bool {
        true
    }

    fn handle(&self, event: &LifecycleEvent) -> bool {
        self.events.push(format!("{}:{}", self.name, event));
        self.answer
    }
}

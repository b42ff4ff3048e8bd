// src/dag/scheduler.rs

use std::collections::BinaryHeap;

use tracing::{debug, info, warn};

use crate::dag::graph::{DependencyGraph, ReadyKey};
use crate::dag::scheduler_step::SchedulerStep;
use crate::task::{TaskId, TaskNode};

/// Where a node is from the scheduler's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Some dependency has not finished yet.
    Waiting,
    /// Handed out as ready; not reported finished yet.
    Admitted,
    /// Reported finished (successfully, failed or canceled).
    Done,
}

/// Scheduler holds the immutable graph plus per-node bookkeeping.
///
/// It is responsible for:
/// - handing out the nodes without dependencies when the run starts
/// - counting down unfinished dependencies as nodes finish
/// - handing out dependents once all their dependencies finished
/// - telling the caller when every node has finished
///
/// It performs no IO and never awaits; the async driver feeds it completion
/// notifications and admits whatever it returns.
///
/// Failure does not block dependents: a failed or canceled node counts as
/// finished, and dependents can inspect its outcome.
#[derive(Debug)]
pub struct Scheduler {
    graph: DependencyGraph,
    states: Vec<SlotState>,
    /// Number of dependencies of each node not yet reported finished.
    pending_deps: Vec<usize>,
    done: usize,
    started: bool,
}

impl Scheduler {
    pub fn new(graph: DependencyGraph) -> Self {
        let pending_deps = (0..graph.len()).map(|pos| graph.deps_at(pos).len()).collect();
        let states = vec![SlotState::Waiting; graph.len()];

        Self {
            graph,
            states,
            pending_deps,
            done: 0,
            started: false,
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Start the run: returns the nodes that have no dependencies.
    ///
    /// An empty graph (or one whose nodes were all canceled beforehand) is
    /// finished right away. Calling `start` twice returns an empty step.
    pub fn start(&mut self) -> SchedulerStep {
        if self.started {
            warn!("scheduler: start called twice; ignoring");
            return SchedulerStep::nothing();
        }
        self.started = true;

        let ready: Vec<usize> = (0..self.graph.len())
            .filter(|&pos| self.pending_deps[pos] == 0)
            .collect();

        info!(
            tasks = self.graph.len(),
            roots = ready.len(),
            "scheduler: starting graph run"
        );

        SchedulerStep {
            newly_ready: self.admit(ready),
            graph_just_finished: self.done == self.graph.len(),
        }
    }

    /// Record that node `id` finished and return what became ready.
    ///
    /// Accepts nodes that were never admitted (canceled while waiting); they
    /// still release their dependents. Repeated or unknown ids are ignored.
    pub fn handle_finished(&mut self, id: TaskId) -> SchedulerStep {
        let Some(pos) = self.graph.position(id) else {
            warn!(id = %id, "scheduler: completion for unknown task; ignoring");
            return SchedulerStep::nothing();
        };

        if self.states[pos] == SlotState::Done {
            debug!(task = %self.graph.nodes()[pos].name(), "scheduler: duplicate completion; ignoring");
            return SchedulerStep::nothing();
        }

        self.states[pos] = SlotState::Done;
        self.done += 1;
        debug!(
            task = %self.graph.nodes()[pos].name(),
            done = self.done,
            total = self.graph.len(),
            "scheduler: task finished"
        );

        let mut ready = Vec::new();
        for &dependent in self.graph.dependents_at(pos) {
            self.pending_deps[dependent] -= 1;
            if self.pending_deps[dependent] == 0 && self.states[dependent] == SlotState::Waiting {
                ready.push(dependent);
            }
        }

        // Before `start`, a finished node still counts but nothing is handed
        // out; `start` picks up whatever is ready then.
        let newly_ready = if self.started { self.admit(ready) } else { Vec::new() };

        let graph_just_finished = self.done == self.graph.len();
        if graph_just_finished {
            info!("scheduler: all tasks finished");
        }

        SchedulerStep {
            newly_ready,
            graph_just_finished: graph_just_finished && self.started,
        }
    }

    /// Whether every node has been reported finished.
    pub fn is_finished(&self) -> bool {
        self.started && self.done == self.graph.len()
    }

    pub fn state_of(&self, id: TaskId) -> Option<SlotState> {
        self.graph.position(id).map(|pos| self.states[pos])
    }

    /// Whether every dependency of `id` has finished. `None` for unknown ids.
    pub fn deps_satisfied(&self, id: TaskId) -> Option<bool> {
        self.graph.position(id).map(|pos| self.pending_deps[pos] == 0)
    }

    /// Mark `ready` as admitted, in priority/insertion order.
    fn admit(&mut self, ready: Vec<usize>) -> Vec<TaskNode> {
        let mut heap: BinaryHeap<ReadyKey> =
            ready.into_iter().map(|pos| self.graph.ready_key(pos)).collect();

        let mut out = Vec::with_capacity(heap.len());
        while let Some(key) = heap.pop() {
            let pos = key.pos();
            if self.states[pos] != SlotState::Waiting {
                continue;
            }
            self.states[pos] = SlotState::Admitted;
            out.push(self.graph.nodes()[pos].clone());
        }
        out
    }
}

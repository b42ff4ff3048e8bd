// src/dag/graph.rs

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{BootError, Result};
use crate::task::{TaskId, TaskNode};

/// Adjacency of one node, by position in [`DependencyGraph::nodes`].
#[derive(Debug, Clone, Default)]
struct Links {
    /// Direct dependencies: nodes that must finish before this one starts.
    deps: Vec<usize>,
    /// Direct dependents: nodes that list this one as a dependency.
    dependents: Vec<usize>,
}

/// A validated, acyclic set of task nodes.
///
/// Dependencies are read from each node's
/// [`dependencies`](TaskNode::dependencies) when the graph is built; adding
/// dependencies to a node afterwards is not reflected here.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<TaskId, usize>,
    links: Vec<Links>,
}

impl DependencyGraph {
    /// Build a graph from `nodes`.
    ///
    /// Fails if a node appears twice, if a node depends on a node that is
    /// not part of `nodes`, or if the dependencies form a cycle.
    pub fn new(nodes: impl IntoIterator<Item = TaskNode>) -> Result<Self> {
        let nodes: Vec<TaskNode> = nodes.into_iter().collect();

        let mut index = HashMap::with_capacity(nodes.len());
        for (pos, node) in nodes.iter().enumerate() {
            if index.insert(node.id(), pos).is_some() {
                return Err(BootError::ConfigError(format!(
                    "task '{}' was added to the graph twice",
                    node.name()
                )));
            }
        }

        let mut links = vec![Links::default(); nodes.len()];
        for (pos, node) in nodes.iter().enumerate() {
            for dep in node.dependencies() {
                let Some(&dep_pos) = index.get(&dep.id()) else {
                    return Err(BootError::UnknownDependency {
                        task: node.name().to_string(),
                        dependency: dep.name().to_string(),
                    });
                };
                links[pos].deps.push(dep_pos);
                links[dep_pos].dependents.push(pos);
            }
        }

        let edges = links
            .iter()
            .enumerate()
            .flat_map(|(pos, l)| l.deps.iter().map(move |&dep| (dep, pos)));

        if let Some(pos) = detect_cycle(0..nodes.len(), edges) {
            return Err(BootError::DagCycle(format!(
                "cycle detected in task graph involving task '{}'",
                nodes[pos].name()
            )));
        }

        Ok(Self {
            nodes,
            index,
            links,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes, in the order they were handed to [`new`](Self::new).
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn node(&self, id: TaskId) -> Option<&TaskNode> {
        self.position(id).map(|pos| &self.nodes[pos])
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.index.contains_key(&id)
    }

    /// Immediate dependencies of a node.
    pub fn dependencies_of(&self, id: TaskId) -> Vec<&TaskNode> {
        self.position(id)
            .map(|pos| self.links[pos].deps.iter().map(|&d| &self.nodes[d]).collect())
            .unwrap_or_default()
    }

    /// Immediate dependents of a node.
    pub fn dependents_of(&self, id: TaskId) -> Vec<&TaskNode> {
        self.position(id)
            .map(|pos| {
                self.links[pos]
                    .dependents
                    .iter()
                    .map(|&d| &self.nodes[d])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nodes without dependencies.
    pub fn roots(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes
            .iter()
            .zip(&self.links)
            .filter(|(_, l)| l.deps.is_empty())
            .map(|(node, _)| node)
    }

    /// A valid execution order.
    ///
    /// Among nodes that are ready at the same point, higher priority comes
    /// first, then insertion order.
    pub fn topological_order(&self) -> Vec<&TaskNode> {
        let mut remaining: Vec<usize> = self.links.iter().map(|l| l.deps.len()).collect();
        let mut ready: BinaryHeap<ReadyKey> = remaining
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(pos, _)| self.ready_key(pos))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(key) = ready.pop() {
            let pos = key.pos();
            order.push(&self.nodes[pos]);
            for &dependent in &self.links[pos].dependents {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.push(self.ready_key(dependent));
                }
            }
        }
        order
    }

    pub(crate) fn position(&self, id: TaskId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub(crate) fn deps_at(&self, pos: usize) -> &[usize] {
        &self.links[pos].deps
    }

    pub(crate) fn dependents_at(&self, pos: usize) -> &[usize] {
        &self.links[pos].dependents
    }

    pub(crate) fn ready_key(&self, pos: usize) -> ReadyKey {
        ReadyKey(self.nodes[pos].priority(), Reverse(pos))
    }
}

/// Max-heap key: priority first, then earlier insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ReadyKey(i32, Reverse<usize>);

impl ReadyKey {
    pub(crate) fn pos(self) -> usize {
        (self.1).0
    }
}

/// Return a node that is part of a cycle, if there is one.
///
/// Edge direction is `dependency -> dependent`.
pub(crate) fn detect_cycle<N>(
    nodes: impl IntoIterator<Item = N>,
    edges: impl IntoIterator<Item = (N, N)>,
) -> Option<N>
where
    N: Copy + Ord + Hash,
{
    let mut graph: DiGraphMap<N, ()> = DiGraphMap::new();
    for node in nodes {
        graph.add_node(node);
    }
    for (from, to) in edges {
        graph.add_edge(from, to, ());
    }

    // A topological sort fails if and only if there is a cycle.
    toposort(&graph, None).err().map(|cycle| cycle.node_id())
}

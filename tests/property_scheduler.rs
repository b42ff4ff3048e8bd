use std::collections::{BTreeSet, HashSet};

use proptest::prelude::*;

use bootdag::dag::{DependencyGraph, Scheduler};
use bootdag::task::{TaskId, TaskNode};

// Strategy to generate a valid DAG.
// Acyclic by construction: task N may only depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw_deps| {
            raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    if i == 0 {
                        BTreeSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    }
                })
                .collect()
        })
    })
}

fn build_nodes(deps: &[BTreeSet<usize>], priorities: &[i32]) -> Vec<TaskNode> {
    let nodes: Vec<TaskNode> = (0..deps.len())
        .map(|i| {
            TaskNode::builder(format!("task_{i}"))
                .priority(priorities.get(i).copied().unwrap_or(0))
                .noop()
        })
        .collect();
    for (i, task_deps) in deps.iter().enumerate() {
        for &d in task_deps {
            nodes[i].add_dependency(&nodes[d]).unwrap();
        }
    }
    nodes
}

proptest! {
    #[test]
    fn every_node_is_admitted_once_and_only_after_its_deps(
        deps in dag_strategy(12),
        priorities in proptest::collection::vec(-3..3i32, 12),
        picks in proptest::collection::vec(any::<usize>(), 64),
    ) {
        let nodes = build_nodes(&deps, &priorities);
        let position = |id: TaskId| nodes.iter().position(|n| n.id() == id).unwrap();

        let mut sched = Scheduler::new(DependencyGraph::new(nodes.clone()).unwrap());

        let mut admitted: HashSet<usize> = HashSet::new();
        let mut finished: BTreeSet<usize> = BTreeSet::new();
        let mut in_flight: Vec<usize> = Vec::new();
        let mut finish_reports = 0;

        let first = sched.start();
        if first.graph_just_finished {
            finish_reports += 1;
        }
        for node in first.newly_ready {
            let pos = position(node.id());
            prop_assert!(deps[pos].is_empty(), "task_{} admitted with unfinished deps", pos);
            prop_assert!(admitted.insert(pos));
            in_flight.push(pos);
        }

        // Complete admitted nodes in a random order.
        let mut step = 0;
        while !in_flight.is_empty() {
            let pick = picks[step % picks.len()] % in_flight.len();
            step += 1;

            let done = in_flight.swap_remove(pick);
            finished.insert(done);

            let result = sched.handle_finished(nodes[done].id());
            if result.graph_just_finished {
                finish_reports += 1;
            }
            for node in result.newly_ready {
                let pos = position(node.id());
                prop_assert!(
                    deps[pos].is_subset(&finished),
                    "task_{} admitted before all of {:?} finished",
                    pos,
                    deps[pos]
                );
                prop_assert!(admitted.insert(pos), "task_{} admitted twice", pos);
                in_flight.push(pos);
            }
        }

        prop_assert_eq!(admitted.len(), nodes.len());
        prop_assert_eq!(finish_reports, 1);
        prop_assert!(sched.is_finished());
    }

    #[test]
    fn topological_order_respects_every_edge(
        deps in dag_strategy(12),
        priorities in proptest::collection::vec(-3..3i32, 12),
    ) {
        let nodes = build_nodes(&deps, &priorities);
        let graph = DependencyGraph::new(nodes.clone()).unwrap();

        let order: Vec<usize> = graph
            .topological_order()
            .iter()
            .map(|n| nodes.iter().position(|m| m.id() == n.id()).unwrap())
            .collect();
        prop_assert_eq!(order.len(), nodes.len());

        let rank = |pos: usize| order.iter().position(|&p| p == pos).unwrap();
        for (i, task_deps) in deps.iter().enumerate() {
            for &d in task_deps {
                prop_assert!(rank(d) < rank(i), "task_{} ordered before its dependency task_{}", i, d);
            }
        }
    }
}

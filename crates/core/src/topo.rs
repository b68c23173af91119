//! # Topological Scheduling
//!
//! The execution order of a flow graph is computed with Kahn's algorithm,
//! run *from the outputs towards the inputs*:
//!
//! 1. Seed the queue with the output nodes (they have no consumers).
//! 2. Pop a node, append it, and drop its edges to its producers.
//! 3. A producer whose last consumer was dropped becomes eligible.
//!
//! The result lists consumers before producers; reversing it gives an order
//! in which every node comes after all of its producers. Walking the same
//! list forwards in the reversed form visits consumers first, which is what
//! backward execution needs.
//!
//! Starting from the outputs makes two structural errors visible:
//!
//! - an input node that never shows up cannot reach any output,
//! - edges that are still pending when the queue runs dry form a cycle.
//!
//! Ties between eligible nodes are broken by queue order over ordered sets,
//! which is deterministic but not otherwise meaningful.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction as EdgeDirection;

use crate::error::GraphError;

/// Order the nodes of `graph` so that producers come before consumers.
///
/// Edges of `graph` point from producer to consumer. Only nodes reachable
/// backwards from `outputs` are returned.
pub fn topological_order<N: fmt::Display, E>(
    graph: &DiGraph<N, E>,
    inputs: &[NodeIndex],
    outputs: &[NodeIndex],
) -> Result<Vec<NodeIndex>, GraphError> {
    // node -> producers, node -> consumers
    let mut producers: HashMap<NodeIndex, BTreeSet<NodeIndex>> = graph
        .node_indices()
        .map(|n| {
            (
                n,
                graph.neighbors_directed(n, EdgeDirection::Incoming).collect(),
            )
        })
        .collect();
    let mut consumers: HashMap<NodeIndex, BTreeSet<NodeIndex>> = HashMap::new();
    for (&node, node_producers) in &producers {
        for &producer in node_producers {
            consumers.entry(producer).or_default().insert(node);
        }
    }

    let mut sorted: Vec<NodeIndex> = Vec::with_capacity(graph.node_count());
    let mut queue: VecDeque<NodeIndex> = outputs.iter().copied().collect();

    while let Some(node) = queue.pop_front() {
        sorted.push(node);
        let pending = producers.get_mut(&node).map(std::mem::take).unwrap_or_default();
        for producer in pending {
            if let Some(remaining) = consumers.get_mut(&producer) {
                remaining.remove(&node);
                if remaining.is_empty() {
                    queue.push_back(producer);
                }
            }
        }
    }

    let reached: HashSet<NodeIndex> = sorted.iter().copied().collect();
    for &input in inputs {
        if !reached.contains(&input) {
            return Err(GraphError::DisconnectedInput {
                node: graph
                    .node_weight(input)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("#{}", input.index())),
            });
        }
    }

    let remaining: usize = consumers.values().map(BTreeSet::len).sum();
    if remaining > 0 {
        return Err(GraphError::Cyclic { remaining });
    }

    sorted.reverse();
    log::debug!("topological order over {} nodes", sorted.len());
    Ok(sorted)
}

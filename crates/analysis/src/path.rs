//! Shortest path search
//!
//! Breadth-first search by edge count. Weights are reported alongside the
//! result but never used for routing.
//!
//! Among equal-length paths the first one discovered wins, which follows the
//! order of each adjacency list. Adjacency order is the order relation rows
//! were fetched, so the chosen path may change when the store returns rows in
//! a different order. Build the subgraph with `stable_order` to sort
//! adjacency by relation id when a reproducible choice matters.

use crate::subgraph::{Edge, Node, Subgraph};
use serde::{Deserialize, Serialize};
use shared::EntityRef;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Path {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// Always `nodes.len() - 1`
    pub distance: usize,
    /// Sum of strengths of the traversed edges that carry one
    pub total_weight: u32,
}

/// Find a shortest path from `source` to `target`
///
/// Returns `None` when either end is not in the graph or the two are not
/// connected.
pub fn find_path(graph: &Subgraph, source: &EntityRef, target: &EntityRef) -> Option<Path> {
    if !graph.contains(source) || !graph.contains(target) {
        return None;
    }

    // node -> (previous node, edge index)
    let mut parents: HashMap<&EntityRef, (&EntityRef, usize)> = HashMap::new();
    let mut visited: HashSet<&EntityRef> = HashSet::from([source]);
    let mut queue: VecDeque<&EntityRef> = VecDeque::from([source]);

    while let Some(current) = queue.pop_front() {
        if current == target {
            break;
        }
        for adjacent in graph.neighbors(current) {
            // Visited on enqueue: nothing is expanded twice
            if visited.insert(&adjacent.neighbor) {
                parents.insert(&adjacent.neighbor, (current, adjacent.edge));
                queue.push_back(&adjacent.neighbor);
            }
        }
    }

    if !visited.contains(target) {
        return None;
    }

    let mut keys = vec![target];
    let mut edge_indexes = Vec::new();
    let mut cursor = target;
    while let Some(&(previous, edge)) = parents.get(cursor) {
        edge_indexes.push(edge);
        keys.push(previous);
        cursor = previous;
    }
    keys.reverse();
    edge_indexes.reverse();

    let nodes: Vec<Node> = keys.iter().filter_map(|k| graph.node(k).cloned()).collect();
    let edges: Vec<Edge> = edge_indexes
        .iter()
        .filter_map(|&i| graph.edge(i).cloned())
        .collect();
    let total_weight = edges
        .iter()
        .filter_map(|e| e.weight.map(|w| u32::from(w.value())))
        .sum();

    Some(Path {
        distance: nodes.len().saturating_sub(1),
        nodes,
        edges,
        total_weight,
    })
}

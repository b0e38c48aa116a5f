//! A* search over the navigation graph

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use log::debug;
use thiserror::Error;

use crate::core::types::Vec3;
use crate::octree::NodeKey;
use super::graph::Graph;

/// Expected, recoverable outcomes of a path query
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("navigation graph is empty")]
    EmptyGraph,

    #[error("node {0} is not in the navigation graph")]
    UnknownNode(NodeKey),

    #[error("no path from {start} to {goal}")]
    Unreachable { start: NodeKey, goal: NodeKey },
}

/// Sequence of graph nodes from start to goal with its total edge weight
#[derive(Clone, Debug, PartialEq)]
pub struct NodePath {
    pub keys: Vec<NodeKey>,
    pub cost: f32,
}

/// Open-set entry. Ordered so that `BinaryHeap` pops the lowest `f`;
/// ties go to the lower `h`, then to the smaller key.
#[derive(Clone, Copy, Debug)]
struct OpenEntry {
    f: f32,
    h: f32,
    key: NodeKey,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.f.total_cmp(&self.f)
            .then_with(|| other.h.total_cmp(&self.h))
            .then_with(|| other.key.cmp(&self.key))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

/// Shortest path between two graph nodes.
///
/// Euclidean distance to the goal is the heuristic, which never
/// overestimates since edge weights are distances between node positions.
/// Superseded heap entries are skipped when popped instead of being
/// removed.
pub fn find_node_path(graph: &Graph, start: NodeKey, goal: NodeKey) -> Result<NodePath, PathError> {
    let start_node = graph.node(start).ok_or(PathError::UnknownNode(start))?;
    let goal_pos = graph.node(goal).ok_or(PathError::UnknownNode(goal))?.position;
    if start == goal {
        return Ok(NodePath { keys: vec![start], cost: 0.0 });
    }

    let mut open = BinaryHeap::new();
    let mut closed: HashSet<NodeKey> = HashSet::new();
    let mut g_cost: HashMap<NodeKey, f32> = HashMap::new();
    let mut parent: HashMap<NodeKey, NodeKey> = HashMap::new();

    let h = start_node.position.distance(goal_pos);
    g_cost.insert(start, 0.0);
    open.push(OpenEntry { f: h, h, key: start });

    while let Some(OpenEntry { key: current, .. }) = open.pop() {
        if !closed.insert(current) {
            continue;
        }
        let g = g_cost.get(&current).copied().unwrap_or(f32::INFINITY);
        if current == goal {
            let keys = reconstruct(&parent, start, goal);
            debug!("A* reached {} in {} hops, {} nodes closed", goal, keys.len() - 1, closed.len());
            return Ok(NodePath { keys, cost: g });
        }

        let Some(node) = graph.node(current) else { continue };
        for (&next, &weight) in &node.neighbors {
            if closed.contains(&next) {
                continue;
            }
            let tentative = g + weight;
            if g_cost.get(&next).is_some_and(|&known| known <= tentative) {
                continue;
            }
            let Some(next_node) = graph.node(next) else { continue };
            let h = next_node.position.distance(goal_pos);
            g_cost.insert(next, tentative);
            parent.insert(next, current);
            open.push(OpenEntry { f: tentative + h, h, key: next });
        }
    }

    Err(PathError::Unreachable { start, goal })
}

fn reconstruct(parent: &HashMap<NodeKey, NodeKey>, start: NodeKey, goal: NodeKey) -> Vec<NodeKey> {
    let mut keys = vec![goal];
    let mut current = goal;
    while current != start {
        match parent.get(&current) {
            Some(&prev) => {
                keys.push(prev);
                current = prev;
            }
            None => break,
        }
    }
    keys.reverse();
    keys
}

/// Waypoints from `start` to `end` through the graph.
///
/// Both points are snapped to their nearest graph nodes. The returned list
/// begins with the literal `start`, ends with the literal `end`, and has the
/// positions of the intermediate nodes in between. When both points snap to
/// the same node the result is just `[start, end]`.
pub fn find_path(graph: &Graph, start: Vec3, end: Vec3) -> Result<Vec<Vec3>, PathError> {
    let start_key = graph.nearest_node(start).ok_or(PathError::EmptyGraph)?;
    let end_key = graph.nearest_node(end).ok_or(PathError::EmptyGraph)?;
    if start_key == end_key {
        return Ok(vec![start, end]);
    }

    let path = find_node_path(graph, start_key, end_key)?;
    let interior = &path.keys[1..path.keys.len() - 1];

    let mut waypoints = Vec::with_capacity(interior.len() + 2);
    waypoints.push(start);
    waypoints.extend(interior.iter().filter_map(|key| graph.node(*key)).map(|n| n.position));
    waypoints.push(end);
    Ok(waypoints)
}

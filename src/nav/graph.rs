//! Navigation graph derived from the leaves of a classified spatial index

use std::collections::BTreeMap;
use std::time::Instant;

use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::types::{IVec3, Vec3};
use crate::octree::{NodeKey, OctreeNode, SpatialIndex};

/// 6 face directions followed by the 12 two-axis diagonals
pub const FACE_AND_EDGE_DIRECTIONS: [IVec3; 18] = [
    IVec3::new(1, 0, 0),
    IVec3::new(-1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(0, -1, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(0, 0, -1),
    IVec3::new(1, 1, 0),
    IVec3::new(1, -1, 0),
    IVec3::new(-1, 1, 0),
    IVec3::new(-1, -1, 0),
    IVec3::new(1, 0, 1),
    IVec3::new(1, 0, -1),
    IVec3::new(-1, 0, 1),
    IVec3::new(-1, 0, -1),
    IVec3::new(0, 1, 1),
    IVec3::new(0, 1, -1),
    IVec3::new(0, -1, 1),
    IVec3::new(0, -1, -1),
];

/// The 8 three-axis diagonals
pub const CORNER_DIRECTIONS: [IVec3; 8] = [
    IVec3::new(1, 1, 1),
    IVec3::new(1, 1, -1),
    IVec3::new(1, -1, 1),
    IVec3::new(1, -1, -1),
    IVec3::new(-1, 1, 1),
    IVec3::new(-1, 1, -1),
    IVec3::new(-1, -1, 1),
    IVec3::new(-1, -1, -1),
];

/// Which neighbor directions each leaf searches
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborDirections {
    /// Faces and two-axis diagonals (18)
    #[default]
    FacesAndEdges,
    /// Faces, edges and corners (26)
    All,
}

impl NeighborDirections {
    pub fn offsets(&self) -> Vec<IVec3> {
        match self {
            Self::FacesAndEdges => FACE_AND_EDGE_DIRECTIONS.to_vec(),
            Self::All => FACE_AND_EDGE_DIRECTIONS
                .iter()
                .chain(CORNER_DIRECTIONS.iter())
                .copied()
                .collect(),
        }
    }
}

/// One navigable leaf and its outgoing edges
#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
    pub key: NodeKey,
    /// Leaf center
    pub position: Vec3,
    /// Neighbor key -> edge weight (center-to-center distance)
    pub neighbors: BTreeMap<NodeKey, f32>,
}

/// Directed weighted graph over navigable leaves.
///
/// Nodes and adjacency are kept in ordered maps so that iteration, and
/// therefore every search over the graph, is deterministic.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: BTreeMap<NodeKey, GraphNode>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node without edges (no-op if present)
    pub fn add_node(&mut self, key: NodeKey, position: Vec3) {
        self.nodes.entry(key).or_insert_with(|| GraphNode {
            key,
            position,
            neighbors: BTreeMap::new(),
        });
    }

    /// Add the directed edge `from -> to` weighted by the distance between
    /// the two positions. Returns false if either endpoint is unknown.
    pub fn add_edge(&mut self, from: NodeKey, to: NodeKey) -> bool {
        let Some(target) = self.nodes.get(&to).map(|n| n.position) else {
            return false;
        };
        match self.nodes.get_mut(&from) {
            Some(source) => {
                let weight = source.position.distance(target);
                source.neighbors.insert(to, weight);
                true
            }
            None => false,
        }
    }

    pub fn node(&self, key: NodeKey) -> Option<&GraphNode> {
        self.nodes.get(&key)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.neighbors.len()).sum()
    }

    pub fn has_edge(&self, from: NodeKey, to: NodeKey) -> bool {
        self.nodes
            .get(&from)
            .is_some_and(|n| n.neighbors.contains_key(&to))
    }

    pub fn edge_weight(&self, from: NodeKey, to: NodeKey) -> Option<f32> {
        self.nodes.get(&from)?.neighbors.get(&to).copied()
    }

    /// Node whose position is closest to `point`; ties go to the smaller key.
    pub fn nearest_node(&self, point: Vec3) -> Option<NodeKey> {
        self.nodes
            .values()
            .min_by(|a, b| {
                a.position
                    .distance_squared(point)
                    .total_cmp(&b.position.distance_squared(point))
            })
            .map(|n| n.key)
    }
}

/// Counts from one graph build
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    /// Edge pairs linking leaves of different levels
    pub cross_level_links: usize,
    /// Edges dropped because an endpoint was not a graph node
    pub missing_nodes: usize,
}

/// Nearest same-size-or-larger leaf in direction `dir` from `leaf`.
///
/// Starts at `leaf.index + dir` on the leaf's own level and walks towards
/// the root by halving the index until a node exists. A subdivided node
/// found on the way means the neighbors there are smaller, which this search
/// does not report.
pub fn find_neighbor<'a>(index: &'a SpatialIndex, leaf: &OctreeNode, dir: IVec3) -> Option<&'a OctreeNode> {
    let mut goal = NodeKey::new(leaf.key.index() + dir, leaf.key.level);
    if !goal.is_within_level() {
        return None;
    }
    loop {
        if let Some(node) = index.get(goal) {
            return node.is_leaf().then_some(node);
        }
        goal = goal.parent()?;
    }
}

/// Build the navigation graph over every navigable leaf of `index`.
///
/// Neighbor searches run in parallel against the read-only index; edges are
/// collected per leaf and inserted afterwards on this thread. Same-level
/// neighbors get a single directed edge (the other side discovers its own).
/// A larger neighbor never finds the smaller leaf, so those pairs get edges
/// in both directions.
pub fn build_graph(index: &SpatialIndex, directions: NeighborDirections) -> (Graph, GraphStats) {
    let start = Instant::now();
    let offsets = directions.offsets();

    let leaves: Vec<&OctreeNode> = {
        let mut leaves: Vec<&OctreeNode> = index.leaves().filter(|n| n.is_navigable()).collect();
        leaves.sort_unstable_by_key(|n| n.key);
        leaves
    };

    let discovered: Vec<(NodeKey, Vec<NodeKey>)> = leaves
        .par_iter()
        .map(|leaf| {
            let mut found: Vec<NodeKey> = offsets
                .iter()
                .filter_map(|dir| find_neighbor(index, leaf, *dir))
                .filter(|neighbor| neighbor.is_navigable())
                .map(|neighbor| neighbor.key)
                .collect();
            // A larger neighbor can be reached through several directions
            found.sort_unstable();
            found.dedup();
            (leaf.key, found)
        })
        .collect();

    let mut graph = Graph::new();
    for leaf in &leaves {
        graph.add_node(leaf.key, leaf.center);
    }

    let mut stats = GraphStats::default();
    for (from, neighbors) in discovered {
        for to in neighbors {
            if !graph.contains(to) {
                warn!("Neighbor {} of {} has no graph node, skipping edge", to, from);
                stats.missing_nodes += 1;
                continue;
            }
            graph.add_edge(from, to);
            if to.level != from.level {
                graph.add_edge(to, from);
                stats.cross_level_links += 1;
            }
        }
    }

    stats.nodes = graph.len();
    stats.edges = graph.edge_count();
    info!(
        "Built navigation graph: {} nodes, {} edges ({} cross-level links) in {:.1}ms",
        stats.nodes,
        stats.edges,
        stats.cross_level_links,
        start.elapsed().as_secs_f64() * 1000.0,
    );
    (graph, stats)
}

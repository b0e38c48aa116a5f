//! Navigation graph, path search and path simplification

pub mod graph;
pub mod astar;
pub mod smooth;

pub use graph::{build_graph, find_neighbor, Graph, GraphNode, GraphStats, NeighborDirections};
pub use astar::{find_node_path, find_path, NodePath, PathError};
pub use smooth::smooth;

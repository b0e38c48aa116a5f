//! Flat keyed octree: generation, classification, queries and persistence

pub mod node;
pub mod index;
pub mod voxelizer;
pub mod builder;
pub mod bounds;
pub mod line_of_sight;
pub mod persist;

pub use node::{NodeKey, OctreeNode, CHILD_OFFSETS, MAX_LEVEL};
pub use index::SpatialIndex;
pub use voxelizer::{voxelize, Voxelizer};
pub use builder::ParallelBuilder;
pub use bounds::{BoundsClassifier, BoundsStats, RayHit, Raycaster};
pub use line_of_sight::segment_clear;

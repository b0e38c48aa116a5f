//! Octonav - octree-based 3D navigation for grounded and flying agents

pub mod core;
pub mod math;
pub mod mesh;
pub mod octree;
pub mod nav;
pub mod pipeline;

pub use crate::core::{Error, Result};
pub use mesh::{TriangleMesh, TriangleRaycaster};
pub use octree::{NodeKey, SpatialIndex};
pub use nav::{Graph, PathError};
pub use pipeline::{BuildHandle, NavConfig, NavPipeline, NavigationData};

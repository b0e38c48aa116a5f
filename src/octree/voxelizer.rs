//! Triangle voxelization into a spatial index

use crate::core::types::Vec3;
use crate::math::{Aabb, Triangle};
use super::index::SpatialIndex;
use super::node::NodeKey;

/// Marks every max-level cell touched by the triangles as collision,
/// subdividing from the root down to `max_level` along the way.
///
/// Nodes a triangle does not touch are pruned without recursing. With no
/// triangles the index keeps only its undivided root.
pub fn voxelize(triangles: &[Triangle], max_level: u8, index: &mut SpatialIndex) {
    let voxelizer = Voxelizer::new(max_level);
    for triangle in triangles {
        voxelizer.insert_triangle(triangle, index);
    }
}

/// Recursive node/triangle subdivision driver.
#[derive(Clone, Copy, Debug)]
pub struct Voxelizer {
    max_level: u8,
}

impl Voxelizer {
    pub fn new(max_level: u8) -> Self {
        Self { max_level }
    }

    /// Voxelize a single triangle starting at the root.
    pub fn insert_triangle(&self, triangle: &Triangle, index: &mut SpatialIndex) {
        if triangle.is_degenerate() {
            return;
        }
        self.insert_into(triangle, &triangle.aabb(), NodeKey::ROOT, index);
    }

    fn insert_into(&self, triangle: &Triangle, bounds: &Aabb, key: NodeKey, index: &mut SpatialIndex) {
        let cell = index.aabb(key);
        // Box overlap first; the separating-axis test only runs on candidates
        if !bounds.intersects(&cell) {
            return;
        }
        let half = Vec3::splat(index.level_size(key.level) * 0.5);
        if !triangle.intersects_box(index.node_center(key), half) {
            return;
        }

        if key.level >= self.max_level {
            index.insert_or_get(key).contains_collision = true;
            return;
        }

        for child in index.subdivide(key) {
            self.insert_into(triangle, bounds, child, index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::IVec3;
    use crate::mesh::TriangleMesh;

    #[test]
    fn test_empty_mesh_keeps_single_root() {
        let mut index = SpatialIndex::with_root(Vec3::ZERO, 8.0, 3);
        voxelize(&[], 3, &mut index);
        assert_eq!(index.len(), 1);
        assert!(index.root().is_leaf());
        assert!(!index.root().contains_collision);
    }

    #[test]
    fn test_cube_at_level_one_fills_all_children() {
        let cube = TriangleMesh::cuboid("cube", Vec3::ZERO, Vec3::splat(8.0));
        let triangles = cube.world_triangles().unwrap();
        assert_eq!(triangles.len(), 12);

        let mut index = SpatialIndex::with_root(Vec3::ZERO, 8.0, 1);
        voxelize(&triangles, 1, &mut index);

        assert_eq!(index.len(), 9);
        assert!(index.root().has_children);
        assert!(!index.root().contains_collision);
        for child in NodeKey::ROOT.children() {
            let node = index.get(child).unwrap();
            assert!(node.is_leaf());
            assert!(node.contains_collision, "child {} not marked", child);
        }
    }

    #[test]
    fn test_collision_only_at_max_level() {
        let ground = TriangleMesh::plane("ground", Vec3::new(0.0, 0.5, 0.0), 8.0, 8.0);
        let triangles = ground.world_triangles().unwrap();
        let mut index = SpatialIndex::with_root(Vec3::ZERO, 8.0, 3);
        voxelize(&triangles, 3, &mut index);

        for node in index.nodes() {
            if node.contains_collision {
                assert_eq!(node.key.level, 3);
                assert!(node.is_leaf());
            }
        }
        // The plane at y=0.5 lies inside the bottom row of level-3 cells
        let hit = index.get(NodeKey::new(IVec3::new(2, 0, 5), 3)).unwrap();
        assert!(hit.contains_collision);
        let above = index.leaf_at(Vec3::new(4.0, 6.0, 4.0)).unwrap();
        assert!(!above.contains_collision);
        assert!(above.key.level < 3);
        assert!(index.validate().is_ok());
    }

    #[test]
    fn test_triangle_outside_root_is_skipped() {
        let far = Triangle::new(Vec3::splat(20.0), Vec3::new(21.0, 20.0, 20.0), Vec3::new(20.0, 21.0, 20.0));
        let mut index = SpatialIndex::with_root(Vec3::ZERO, 8.0, 3);
        voxelize(&[far], 3, &mut index);
        assert_eq!(index.len(), 1);
        assert!(!index.root().contains_collision);
    }

    #[test]
    fn test_degenerate_triangle_is_ignored() {
        let sliver = Triangle::new(Vec3::ONE, Vec3::splat(2.0), Vec3::splat(3.0));
        let mut index = SpatialIndex::with_root(Vec3::ZERO, 8.0, 3);
        voxelize(&[sliver], 3, &mut index);
        assert_eq!(index.len(), 1);
    }
}

//! Flat, key-addressed octree covering a level's bounding cube

use std::collections::HashMap;

use crate::core::error::Error;
use crate::core::types::{Result, Vec3};
use crate::math::Aabb;
use super::node::{NodeKey, OctreeNode, MAX_LEVEL};

/// Spatial index: every node of the octree stored by its [`NodeKey`].
///
/// Children are never stored as references; they are addressed analytically
/// from the parent key, which lets independent partial indices be merged by
/// key and persisted as a flat list.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    nodes: HashMap<NodeKey, OctreeNode>,
    /// World-space min corner of the root cube
    corner: Vec3,
    /// Edge length of the root cube (power of two)
    root_size: f32,
    /// Deepest level the voxelizer may subdivide to
    max_level: u8,
}

impl SpatialIndex {
    /// Create an index holding only the root, sized to enclose `bounds`.
    ///
    /// The root is the smallest power-of-two cube covering the longest edge
    /// of `bounds`, anchored at `bounds.min`. The max level is the coarsest
    /// one whose cells are still strictly larger (by volume) than the
    /// smallest traversable actor.
    pub fn create_root(bounds: Aabb, smallest_actor: Vec3) -> Self {
        let root_size = Self::root_size_for(&bounds);
        let max_level = Self::level_for_actor(root_size, smallest_actor);
        Self::with_root(bounds.min, root_size, max_level)
    }

    /// Create an index holding only the root with explicit geometry.
    pub fn with_root(corner: Vec3, root_size: f32, max_level: u8) -> Self {
        let mut index = Self {
            nodes: HashMap::new(),
            corner,
            root_size,
            max_level: max_level.min(MAX_LEVEL),
        };
        index.insert_or_get(NodeKey::ROOT);
        index
    }

    /// Fresh root-only index sharing this index's geometry.
    pub fn empty_copy(&self) -> Self {
        Self::with_root(self.corner, self.root_size, self.max_level)
    }

    /// Smallest power-of-two edge (at least 1) whose cube encloses `bounds`
    pub fn root_size_for(bounds: &Aabb) -> f32 {
        let extent = bounds.max_extent();
        let mut size = 1.0f32;
        while size < extent {
            size *= 2.0;
        }
        size
    }

    /// Largest level whose cell volume still exceeds the actor's volume
    pub fn level_for_actor(root_size: f32, smallest_actor: Vec3) -> u8 {
        let actor_volume = smallest_actor.x * smallest_actor.y * smallest_actor.z;
        let mut level = 0u8;
        while level < MAX_LEVEL {
            let next_cell = root_size / (1u32 << (level + 1)) as f32;
            if next_cell.powi(3) > actor_volume {
                level += 1;
            } else {
                break;
            }
        }
        level
    }

    /// Lower the subdivision limit (never raises it)
    pub fn cap_max_level(&mut self, level: u8) {
        self.max_level = self.max_level.min(level);
    }

    pub fn corner(&self) -> Vec3 {
        self.corner
    }

    pub fn root_size(&self) -> f32 {
        self.root_size
    }

    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    /// World-space cube covered by the root
    pub fn bounds(&self) -> Aabb {
        Aabb::cube(self.corner, self.root_size)
    }

    /// Number of nodes (internal and leaf)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// An index always holds at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Edge length of a cell at `level`
    pub fn level_size(&self, level: u8) -> f32 {
        self.root_size / (1u32 << level) as f32
    }

    /// World-space center of the cell addressed by `key`
    pub fn node_center(&self, key: NodeKey) -> Vec3 {
        let size = self.level_size(key.level);
        self.corner + (key.index().as_vec3() + Vec3::splat(0.5)) * size
    }

    pub fn aabb(&self, key: NodeKey) -> Aabb {
        let half = self.level_size(key.level) * 0.5;
        Aabb::from_center_half_extent(self.node_center(key), Vec3::splat(half))
    }

    pub fn root(&self) -> &OctreeNode {
        &self.nodes[&NodeKey::ROOT]
    }

    pub fn get(&self, key: NodeKey) -> Option<&OctreeNode> {
        self.nodes.get(&key)
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut OctreeNode> {
        self.nodes.get_mut(&key)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    /// Fetch the node at `key`, creating an unflagged one if absent.
    pub fn insert_or_get(&mut self, key: NodeKey) -> &mut OctreeNode {
        let size = self.level_size(key.level);
        let center = self.node_center(key);
        self.nodes
            .entry(key)
            .or_insert_with(|| OctreeNode::new(key, size, center))
    }

    /// Replace or add a fully formed node (merge and load paths).
    pub(crate) fn put(&mut self, node: OctreeNode) {
        self.nodes.insert(node.key, node);
    }

    /// Split `key` into its 8 children and return their keys.
    ///
    /// Idempotent: an already subdivided node keeps its existing children.
    pub fn subdivide(&mut self, key: NodeKey) -> [NodeKey; 8] {
        let children = key.children();
        if self.insert_or_get(key).has_children {
            return children;
        }
        for child in children {
            self.insert_or_get(child);
        }
        self.insert_or_get(key).has_children = true;
        children
    }

    /// All nodes, in unspecified order
    pub fn nodes(&self) -> impl Iterator<Item = &OctreeNode> {
        self.nodes.values()
    }

    /// All leaves, in unspecified order
    pub fn leaves(&self) -> impl Iterator<Item = &OctreeNode> {
        self.nodes.values().filter(|node| node.is_leaf())
    }

    /// Every key, sorted (parents before children)
    pub fn sorted_keys(&self) -> Vec<NodeKey> {
        let mut keys: Vec<NodeKey> = self.nodes.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Leaf keys, sorted
    pub fn sorted_leaf_keys(&self) -> Vec<NodeKey> {
        let mut keys: Vec<NodeKey> = self.leaves().map(|node| node.key).collect();
        keys.sort_unstable();
        keys
    }

    /// Deepest node containing `point`, or `None` outside the root cube.
    pub fn leaf_at(&self, point: Vec3) -> Option<&OctreeNode> {
        if !self.bounds().contains_point(point) {
            return None;
        }
        let mut node = self.get(NodeKey::ROOT)?;
        while node.has_children {
            let slot = (point.x >= node.center.x) as usize
                | ((point.y >= node.center.y) as usize) << 1
                | ((point.z >= node.center.z) as usize) << 2;
            node = self.get(node.key.child(slot))?;
        }
        Some(node)
    }

    /// Recompute the derived `subtree_collision` flag bottom-up.
    pub fn update_subtree_flags(&mut self) {
        let mut keys = self.sorted_keys();
        keys.reverse();
        for key in keys {
            let (has_children, own) = match self.nodes.get(&key) {
                Some(node) => (node.has_children, node.contains_collision),
                None => continue,
            };
            let below = has_children
                && key.children().iter().any(|child| {
                    self.nodes.get(child).is_some_and(|n| n.subtree_collision)
                });
            if let Some(node) = self.nodes.get_mut(&key) {
                node.subtree_collision = own || below;
            }
        }
    }

    /// Check the structural invariants: the root exists, every subdivided
    /// node has all 8 children, every non-root node hangs off a subdivided
    /// parent, and collision is only marked on leaves.
    pub fn validate(&self) -> Result<()> {
        if !self.contains(NodeKey::ROOT) {
            return Err(Error::MergeInvariant {
                key: NodeKey::ROOT,
                reason: "root node missing".to_string(),
            });
        }
        for node in self.nodes.values() {
            if node.has_children {
                if node.contains_collision {
                    return Err(Error::MergeInvariant {
                        key: node.key,
                        reason: "collision marked on a subdivided node".to_string(),
                    });
                }
                if let Some(missing) = node.key.children().into_iter().find(|c| !self.contains(*c)) {
                    return Err(Error::MergeInvariant {
                        key: node.key,
                        reason: format!("child {} missing", missing),
                    });
                }
            }
            if let Some(parent) = node.key.parent() {
                if !self.get(parent).is_some_and(|p| p.has_children) {
                    return Err(Error::MergeInvariant {
                        key: node.key,
                        reason: format!("parent {} is not subdivided", parent),
                    });
                }
            }
        }
        Ok(())
    }
}

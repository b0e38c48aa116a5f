//! Octree node model and addressing

use std::fmt;

use crate::core::types::{IVec3, Vec3};

/// Deepest subdivision level an index may use. Keeps every per-axis cell
/// index within the 21 bits a Morton code can carry.
pub const MAX_LEVEL: u8 = 20;

/// Offsets of the 8 children relative to `parent.index * 2`
/// (bit 0 = x, bit 1 = y, bit 2 = z).
pub const CHILD_OFFSETS: [IVec3; 8] = [
    IVec3::new(0, 0, 0),
    IVec3::new(1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(1, 1, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(1, 0, 1),
    IVec3::new(0, 1, 1),
    IVec3::new(1, 1, 1),
];

/// Unique address of a node: integer cell index at a subdivision level.
///
/// Ordering is by level first, so sorted keys list parents before children.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub level: u8,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl NodeKey {
    pub const ROOT: NodeKey = NodeKey { level: 0, x: 0, y: 0, z: 0 };

    pub fn new(index: IVec3, level: u8) -> Self {
        Self { level, x: index.x, y: index.y, z: index.z }
    }

    pub fn index(&self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }

    /// Number of cells per axis at this key's level
    pub fn cells_per_axis(&self) -> i32 {
        1 << self.level
    }

    /// True if every index component lies in `[0, 2^level - 1]`
    pub fn is_within_level(&self) -> bool {
        let max = self.cells_per_axis();
        let index = self.index();
        index.cmpge(IVec3::ZERO).all() && index.cmplt(IVec3::splat(max)).all()
    }

    /// Key of the `slot`-th child (see [`CHILD_OFFSETS`])
    pub fn child(&self, slot: usize) -> NodeKey {
        NodeKey::new(self.index() * 2 + CHILD_OFFSETS[slot], self.level + 1)
    }

    pub fn children(&self) -> [NodeKey; 8] {
        std::array::from_fn(|slot| self.child(slot))
    }

    /// Key of the enclosing node one level up; `None` for the root
    pub fn parent(&self) -> Option<NodeKey> {
        if self.level == 0 {
            return None;
        }
        Some(NodeKey::new(
            IVec3::new(self.x >> 1, self.y >> 1, self.z >> 1),
            self.level - 1,
        ))
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})@{}", self.x, self.y, self.z, self.level)
    }
}

/// A cube of the spatial index.
///
/// Geometry (`size`, `center`) is derived from the key and the owning
/// index's corner and root size; flags are filled in by generation and
/// bounds classification.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OctreeNode {
    pub key: NodeKey,
    /// World-space edge length = root_size / 2^level
    pub size: f32,
    pub center: Vec3,
    /// Subdivided into exactly 8 children
    pub has_children: bool,
    /// Leaf at max level still intersecting geometry
    pub contains_collision: bool,
    /// Collision leaf, or open leaf confirmed above ground
    pub in_bounds: bool,
    /// Derived: this node or any descendant contains collision
    pub subtree_collision: bool,
}

impl OctreeNode {
    pub fn new(key: NodeKey, size: f32, center: Vec3) -> Self {
        Self {
            key,
            size,
            center,
            has_children: false,
            contains_collision: false,
            in_bounds: false,
            subtree_collision: false,
        }
    }

    pub fn is_leaf(&self) -> bool {
        !self.has_children
    }

    /// Leaf an agent can occupy: open space over walkable ground
    pub fn is_navigable(&self) -> bool {
        self.is_leaf() && !self.contains_collision && self.in_bounds
    }

    pub fn level(&self) -> u8 {
        self.key.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_follow_offsets() {
        let key = NodeKey::new(IVec3::new(1, 2, 3), 2);
        for (slot, child) in key.children().iter().enumerate() {
            assert_eq!(child.level, 3);
            assert_eq!(child.index(), key.index() * 2 + CHILD_OFFSETS[slot]);
            assert_eq!(child.parent(), Some(key));
        }
    }

    #[test]
    fn test_root_has_no_parent() {
        assert_eq!(NodeKey::ROOT.parent(), None);
        assert!(NodeKey::ROOT.is_within_level());
    }

    #[test]
    fn test_within_level_bounds() {
        assert!(NodeKey::new(IVec3::new(3, 0, 3), 2).is_within_level());
        assert!(!NodeKey::new(IVec3::new(4, 0, 0), 2).is_within_level());
        assert!(!NodeKey::new(IVec3::new(0, -1, 0), 2).is_within_level());
    }

    #[test]
    fn test_ordering_lists_parents_first() {
        let mut keys = vec![
            NodeKey::new(IVec3::new(1, 0, 0), 1),
            NodeKey::ROOT,
            NodeKey::new(IVec3::new(0, 0, 0), 2),
        ];
        keys.sort();
        assert_eq!(keys[0], NodeKey::ROOT);
        assert_eq!(keys[2].level, 2);
    }

    #[test]
    fn test_navigable() {
        let mut node = OctreeNode::new(NodeKey::ROOT, 8.0, Vec3::splat(4.0));
        assert!(!node.is_navigable());
        node.in_bounds = true;
        assert!(node.is_navigable());
        node.contains_collision = true;
        assert!(!node.is_navigable());
    }
}

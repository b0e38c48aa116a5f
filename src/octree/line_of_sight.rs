//! Straight-segment visibility through the spatial index

use crate::core::types::Vec3;
use crate::math::Ray;
use super::index::SpatialIndex;
use super::node::NodeKey;

/// True if the segment `from`..`to` touches no collision leaf.
///
/// Walks the octree from the root, skipping any subtree whose derived
/// `subtree_collision` flag is clear or whose cube the segment misses, so
/// the flags must be current (see [`SpatialIndex::update_subtree_flags`]).
/// Touching a collision cube's face counts as blocked.
pub fn segment_clear(index: &SpatialIndex, from: Vec3, to: Vec3) -> bool {
    match Ray::between(from, to) {
        Some((ray, length)) => first_blocker(index, NodeKey::ROOT, &ray, length).is_none(),
        None => index.leaf_at(from).is_none_or(|leaf| !leaf.contains_collision),
    }
}

/// Collision leaf hit by the segment, nearest-first among siblings.
pub fn blocking_leaf(index: &SpatialIndex, from: Vec3, to: Vec3) -> Option<NodeKey> {
    let (ray, length) = Ray::between(from, to)?;
    first_blocker(index, NodeKey::ROOT, &ray, length)
}

fn first_blocker(index: &SpatialIndex, key: NodeKey, ray: &Ray, length: f32) -> Option<NodeKey> {
    let node = index.get(key)?;
    if !node.subtree_collision {
        return None;
    }
    if !ray.intersects_aabb_within(&index.aabb(key), length) {
        return None;
    }
    if node.contains_collision {
        return Some(key);
    }
    if !node.has_children {
        return None;
    }

    let mut hits: Vec<(f32, NodeKey)> = key
        .children()
        .into_iter()
        .filter_map(|child| {
            ray.intersects_aabb(&index.aabb(child))
                .filter(|(near, _)| *near <= length)
                .map(|(near, _)| (near, child))
        })
        .collect();
    hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    hits.into_iter()
        .find_map(|(_, child)| first_blocker(index, child, ray, length))
}

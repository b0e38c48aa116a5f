//! String-pulling path simplification

use crate::core::types::Vec3;
use crate::octree::line_of_sight::segment_clear;
use crate::octree::SpatialIndex;

/// Pinned points closer than this to a waypoint protect it
const PIN_EPSILON: f32 = 1.0e-4;

/// Drop every waypoint that a straight, unobstructed segment can skip.
///
/// From each kept point, the farthest later point reachable in a straight
/// line through open voxels is found by scanning backwards, and everything
/// in between is removed. A waypoint matching one of `pinned` is never
/// removed: a shortcut may end on it but not jump over it.
///
/// The result is a fixed point: smoothing it again returns it unchanged.
pub fn smooth(raw: &[Vec3], index: &SpatialIndex, pinned: Option<&[Vec3]>) -> Vec<Vec3> {
    let is_pinned = |point: Vec3| {
        pinned.is_some_and(|pins| pins.iter().any(|p| p.distance_squared(point) <= PIN_EPSILON * PIN_EPSILON))
    };

    let mut path = raw.to_vec();
    let mut start = 0;
    while start + 2 < path.len() {
        let limit = (start + 1..path.len())
            .find(|&i| is_pinned(path[i]))
            .unwrap_or(path.len() - 1);

        let from = path[start];
        if let Some(target) = (start + 2..=limit).rev().find(|&j| segment_clear(index, from, path[j])) {
            path.drain(start + 1..target);
        }
        start += 1;
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::NodeKey;

    /// Root 8 with the level-1 cell x 4..8, y 0..4, z 0..4 solid
    fn walled_index() -> SpatialIndex {
        let mut index = SpatialIndex::with_root(Vec3::ZERO, 8.0, 1);
        let children = index.subdivide(NodeKey::ROOT);
        index.get_mut(children[1]).unwrap().contains_collision = true;
        index.update_subtree_flags();
        index
    }

    fn corner_path() -> Vec<Vec3> {
        vec![
            Vec3::new(2.0, 2.0, 1.0),
            Vec3::new(2.0, 2.0, 3.5),
            Vec3::new(2.0, 2.0, 6.0),
            Vec3::new(6.0, 2.0, 6.0),
        ]
    }

    #[test]
    fn test_straight_line_collapses() {
        let index = walled_index();
        let raw: Vec<Vec3> = (0..5).map(|i| Vec3::new(1.0, 5.0, 1.0 + i as f32 * 1.5)).collect();
        let smoothed = smooth(&raw, &index, None);
        assert_eq!(smoothed, vec![raw[0], raw[4]]);
    }

    #[test]
    fn test_obstacle_keeps_corner() {
        let index = walled_index();
        let raw = corner_path();
        let smoothed = smooth(&raw, &index, None);
        // The direct line clips the solid cell
        assert!(!segment_clear(&index, raw[0], raw[3]));
        assert_eq!(smoothed, vec![raw[0], raw[2], raw[3]]);
    }

    #[test]
    fn test_smoothing_is_idempotent() {
        let index = walled_index();
        let once = smooth(&corner_path(), &index, None);
        let twice = smooth(&once, &index, None);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_pinned_points_survive() {
        let index = walled_index();
        let raw: Vec<Vec3> = (0..4).map(|i| Vec3::new(1.0, 5.0, 1.0 + i as f32 * 2.0)).collect();
        let pins = [raw[2]];
        let smoothed = smooth(&raw, &index, Some(&pins));
        assert_eq!(smoothed, vec![raw[0], raw[2], raw[3]]);
    }

    #[test]
    fn test_short_paths_untouched() {
        let index = walled_index();
        let two = vec![Vec3::ZERO, Vec3::ONE];
        assert_eq!(smooth(&two, &index, None), two);
        assert!(smooth(&[], &index, None).is_empty());
    }
}

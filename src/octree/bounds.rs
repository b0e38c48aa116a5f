//! In-bounds classification of leaves by downward ground probes

use log::info;
use rayon::prelude::*;

use crate::core::types::Vec3;
use super::index::SpatialIndex;
use super::node::NodeKey;

/// Result of a successful ray probe
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// Ray query supplied by the host collision system.
///
/// Probes run concurrently from the rayon pool, so implementations must be
/// thread-safe.
pub trait Raycaster: Send + Sync {
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit>;
}

impl<F> Raycaster for F
where
    F: Fn(Vec3, Vec3, f32) -> Option<RayHit> + Send + Sync,
{
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit> {
        self(origin, direction, max_distance)
    }
}

/// Counts from one classification pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundsStats {
    pub collision_leaves: usize,
    pub grounded_leaves: usize,
    pub out_of_bounds_leaves: usize,
}

/// Marks leaves as in- or out-of-bounds.
///
/// Collision leaves are always in bounds. Every other leaf casts a ray
/// straight down from its center; a hit means it hangs over level geometry.
pub struct BoundsClassifier {
    probe_distance: f32,
}

impl BoundsClassifier {
    pub fn new(probe_distance: f32) -> Self {
        Self { probe_distance }
    }

    /// Classify every leaf of `index`.
    ///
    /// Probes are fanned out over rayon and all of them complete before the
    /// index is touched; the writes happen afterwards on this thread.
    /// `on_probe` is called once per probe as it finishes.
    pub fn classify(
        &self,
        index: &mut SpatialIndex,
        raycaster: &dyn Raycaster,
        on_probe: &(dyn Fn() + Sync),
    ) -> BoundsStats {
        let start = std::time::Instant::now();
        let leaves: Vec<(NodeKey, Vec3, bool)> = index
            .leaves()
            .map(|leaf| (leaf.key, leaf.center, leaf.contains_collision))
            .collect();

        let verdicts: Vec<(NodeKey, bool, bool)> = leaves
            .par_iter()
            .map(|&(key, center, collision)| {
                let in_bounds = collision
                    || raycaster.raycast(center, Vec3::NEG_Y, self.probe_distance).is_some();
                on_probe();
                (key, collision, in_bounds)
            })
            .collect();

        let mut stats = BoundsStats::default();
        for (key, collision, in_bounds) in verdicts {
            if let Some(node) = index.get_mut(key) {
                node.in_bounds = in_bounds;
            }
            match (collision, in_bounds) {
                (true, _) => stats.collision_leaves += 1,
                (false, true) => stats.grounded_leaves += 1,
                (false, false) => stats.out_of_bounds_leaves += 1,
            }
        }

        info!(
            "Classified {} leaves in {:.1}ms ({} collision, {} grounded, {} out of bounds)",
            leaves.len(),
            start.elapsed().as_secs_f64() * 1000.0,
            stats.collision_leaves,
            stats.grounded_leaves,
            stats.out_of_bounds_leaves,
        );
        stats
    }
}

//! Parallel batch voxelization and deterministic merge of partial indices

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::Triangle;
use super::index::SpatialIndex;
use super::node::{NodeKey, OctreeNode};
use super::voxelizer::Voxelizer;

/// Fans triangle batches out over rayon and merges the partial indices.
///
/// Each batch voxelizes into its own root-only copy of the index, so no
/// mutable state is shared between workers. The merge runs on the calling
/// thread after every batch has finished.
#[derive(Clone, Copy, Debug)]
pub struct ParallelBuilder {
    batch_count: usize,
}

impl ParallelBuilder {
    /// `batch_count` of 0 uses one batch per rayon worker thread.
    pub fn new(batch_count: usize) -> Self {
        let batch_count = if batch_count == 0 {
            rayon::current_num_threads()
        } else {
            batch_count
        };
        Self { batch_count }
    }

    pub fn batch_count(&self) -> usize {
        self.batch_count
    }

    /// Voxelize `triangles` into a copy of `template`'s root.
    pub fn build(&self, template: &SpatialIndex, triangles: &[Triangle]) -> Result<SpatialIndex> {
        self.build_with(template, triangles, &|| {}, &AtomicBool::new(false))
    }

    /// Like [`Self::build`], reporting each finished batch through
    /// `on_batch` and giving up with [`Error::Cancelled`] once `cancel` is set.
    /// Results of batches still in flight when cancelled are discarded.
    pub fn build_with(
        &self,
        template: &SpatialIndex,
        triangles: &[Triangle],
        on_batch: &(dyn Fn() + Sync),
        cancel: &AtomicBool,
    ) -> Result<SpatialIndex> {
        let start = Instant::now();
        let ranges = batch_ranges(triangles.len(), self.batch_count);
        let voxelizer = Voxelizer::new(template.max_level());

        let partials: Vec<Option<SpatialIndex>> = ranges
            .par_iter()
            .enumerate()
            .map(|(batch, range)| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let mut partial = template.empty_copy();
                for triangle in &triangles[range.clone()] {
                    voxelizer.insert_triangle(triangle, &mut partial);
                }
                debug!(
                    "Batch {} voxelized triangles {}..{} into {} nodes",
                    batch, range.start, range.end, partial.len()
                );
                on_batch();
                Some(partial)
            })
            .collect();

        if cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }

        let partials: Vec<SpatialIndex> = partials.into_iter().flatten().collect();
        let merged = merge_partials(template, partials)?;

        info!(
            "Voxelized {} triangles in {} batches into {} nodes ({} leaves) in {:.1}ms",
            triangles.len(),
            ranges.len(),
            merged.len(),
            merged.leaves().count(),
            start.elapsed().as_secs_f64() * 1000.0,
        );
        Ok(merged)
    }
}

/// Split `0..total` into `batches` contiguous ranges; the last one absorbs
/// the remainder. Never produces more batches than items (but at least one).
pub fn batch_ranges(total: usize, batches: usize) -> Vec<Range<usize>> {
    let batches = batches.clamp(1, total.max(1));
    let batch_size = total / batches;
    (0..batches)
        .map(|i| {
            let begin = i * batch_size;
            let end = if i + 1 == batches { total } else { begin + batch_size };
            begin..end
        })
        .collect()
}

/// Merge partial indices into one.
///
/// For every key the node with the most information wins: subdivided beats
/// leaf, and among equals collision beats open. The rule is a maximum over
/// a total order, so the result does not depend on the order of `partials`.
pub fn merge_partials(
    template: &SpatialIndex,
    partials: impl IntoIterator<Item = SpatialIndex>,
) -> Result<SpatialIndex> {
    let mut merged = template.empty_copy();
    for partial in partials {
        if partial.corner() != merged.corner() || partial.root_size() != merged.root_size() {
            return Err(Error::MergeInvariant {
                key: NodeKey::ROOT,
                reason: format!(
                    "partial root ({:?}, {}) differs from ({:?}, {})",
                    partial.corner(), partial.root_size(),
                    merged.corner(), merged.root_size(),
                ),
            });
        }
        for node in partial.nodes() {
            let resolved = match merged.get(node.key) {
                Some(existing) => merge_node(existing, node)?,
                None => *node,
            };
            merged.put(resolved);
        }
    }

    debug_assert!(merged.validate().is_ok(), "merged index breaks structural invariants");
    merged.validate()?;
    merged.update_subtree_flags();
    Ok(merged)
}

/// Pick the more informative of two observations of the same node.
pub fn merge_node(a: &OctreeNode, b: &OctreeNode) -> Result<OctreeNode> {
    if a.has_children != b.has_children {
        let leaf = if a.has_children { b } else { a };
        if leaf.contains_collision {
            return Err(Error::MergeInvariant {
                key: a.key,
                reason: "collision leaf in one batch is subdivided in another".to_string(),
            });
        }
    }
    let rank = |n: &OctreeNode| (n.has_children, n.contains_collision);
    Ok(if rank(b) > rank(a) { *b } else { *a })
}

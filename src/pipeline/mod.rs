//! End-to-end navigation build: meshes in, queryable navigation data out
//!
//! voxelize (parallel batches + merge) -> classify bounds -> link graph

pub mod config;
pub mod progress;

pub use config::NavConfig;
pub use progress::{BuildHandle, BuildPhase, BuildProgress};

use std::sync::Arc;
use std::time::Instant;

use log::info;
use tokio::sync::oneshot;

use crate::core::error::Error;
use crate::core::types::{Result, Vec3};
use crate::math::Aabb;
use crate::mesh::{collect_triangles, TriangleMesh};
use crate::nav::{self, build_graph, Graph, GraphStats, NeighborDirections, PathError};
use crate::octree::{BoundsClassifier, BoundsStats, ParallelBuilder, Raycaster, SpatialIndex};

/// Finished, read-only navigation data shared with path queries.
#[derive(Clone, Debug)]
pub struct NavigationData {
    pub index: Arc<SpatialIndex>,
    pub graph: Arc<Graph>,
    /// One message per mesh left out of the build
    pub rejected_meshes: Vec<String>,
    pub bounds_stats: BoundsStats,
    pub graph_stats: GraphStats,
}

impl NavigationData {
    /// Derive the graph for an already classified index (e.g. one loaded
    /// from disk).
    pub fn from_index(index: SpatialIndex, directions: NeighborDirections) -> Self {
        let (graph, graph_stats) = build_graph(&index, directions);
        Self {
            index: Arc::new(index),
            graph: Arc::new(graph),
            rejected_meshes: Vec::new(),
            bounds_stats: BoundsStats::default(),
            graph_stats,
        }
    }

    /// Raw A* waypoints from `start` to `end`
    pub fn find_path(&self, start: Vec3, end: Vec3) -> std::result::Result<Vec<Vec3>, PathError> {
        nav::find_path(&self.graph, start, end)
    }

    pub fn smooth(&self, raw: &[Vec3], pinned: Option<&[Vec3]>) -> Vec<Vec3> {
        nav::smooth(raw, &self.index, pinned)
    }

    /// Search and simplify in one call
    pub fn plan(&self, start: Vec3, end: Vec3, pinned: Option<&[Vec3]>) -> std::result::Result<Vec<Vec3>, PathError> {
        let raw = self.find_path(start, end)?;
        Ok(self.smooth(&raw, pinned))
    }
}

/// Runs the whole build for one level.
#[derive(Clone, Debug)]
pub struct NavPipeline {
    config: NavConfig,
}

impl NavPipeline {
    pub fn new(config: NavConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    /// Root-only index sized for `bounds`, with the level limit from the
    /// smallest actor capped by `max_division_level`.
    pub fn create_root(&self, bounds: Aabb) -> SpatialIndex {
        let mut index = SpatialIndex::create_root(
            bounds.padded(self.config.bounds_padding),
            self.config.smallest_actor_dimension,
        );
        index.cap_max_level(self.config.max_division_level);
        index
    }

    /// Build navigation data on the calling thread.
    ///
    /// Malformed meshes are skipped and listed in the result. `progress`
    /// is updated as work completes and is polled for cancellation between
    /// phases and batches; its phase ends as `Done`, `Failed` or `Cancelled`.
    pub fn generate(
        &self,
        meshes: &[TriangleMesh],
        raycaster: &dyn Raycaster,
        progress: &BuildProgress,
    ) -> Result<NavigationData> {
        let result = self.run(meshes, raycaster, progress);
        let phase = match &result {
            Ok(_) => BuildPhase::Done,
            Err(Error::Cancelled) => BuildPhase::Cancelled,
            Err(_) => BuildPhase::Failed,
        };
        progress.begin(phase, 0);
        result
    }

    fn run(
        &self,
        meshes: &[TriangleMesh],
        raycaster: &dyn Raycaster,
        progress: &BuildProgress,
    ) -> Result<NavigationData> {
        let start = Instant::now();
        progress.check_cancelled()?;

        let (triangles, rejected) = collect_triangles(meshes);
        let bounds = Aabb::from_points(triangles.iter().flat_map(|t| t.vertices()))
            .unwrap_or_default();
        let template = self.create_root(bounds);
        info!(
            "Building navigation for {} meshes ({} triangles): root {} at {:?}, max level {}",
            meshes.len() - rejected.len(),
            triangles.len(),
            template.root_size(),
            template.corner(),
            template.max_level(),
        );

        let builder = ParallelBuilder::new(self.config.batch_count);
        progress.begin(BuildPhase::Voxelizing, builder.batch_count().min(triangles.len()).max(1));
        let mut index = builder.build_with(
            &template,
            &triangles,
            &|| progress.tick(),
            progress.cancel_flag(),
        )?;
        progress.check_cancelled()?;

        progress.begin(BuildPhase::Classifying, index.leaves().count());
        let bounds_stats = BoundsClassifier::new(self.config.ground_probe_distance)
            .classify(&mut index, raycaster, &|| progress.tick());
        progress.check_cancelled()?;

        progress.begin(BuildPhase::Linking, 1);
        let (graph, graph_stats) = build_graph(&index, self.config.neighbor_directions);
        progress.tick();

        info!(
            "Navigation build finished in {:.1}ms: {} nodes, {} graph nodes",
            start.elapsed().as_secs_f64() * 1000.0,
            index.len(),
            graph.len(),
        );

        Ok(NavigationData {
            index: Arc::new(index),
            graph: Arc::new(graph),
            rejected_meshes: rejected.iter().map(|e| e.to_string()).collect(),
            bounds_stats,
            graph_stats,
        })
    }

    /// Start the build on a dedicated thread and return immediately.
    pub fn spawn(self, meshes: Vec<TriangleMesh>, raycaster: Arc<dyn Raycaster>) -> Result<BuildHandle> {
        let progress = Arc::new(BuildProgress::new());
        let (tx, rx) = oneshot::channel();
        let worker_progress = Arc::clone(&progress);
        let thread = std::thread::Builder::new()
            .name("nav-build".to_string())
            .spawn(move || {
                let result = self.generate(&meshes, raycaster.as_ref(), &worker_progress);
                // The handle may have been dropped; nobody is waiting then
                let _ = tx.send(result);
            })?;
        Ok(BuildHandle::new(progress, rx, thread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use crate::mesh::TriangleRaycaster;
    use crate::octree::{NodeKey, RayHit};

    fn flat_level() -> (NavPipeline, Vec<TriangleMesh>, TriangleRaycaster) {
        let config = NavConfig {
            max_division_level: 3,
            batch_count: 2,
            ..Default::default()
        };
        let meshes = vec![TriangleMesh::plane("ground", Vec3::ZERO, 10.0, 10.0)];
        let (triangles, _) = collect_triangles(&meshes);
        (NavPipeline::new(config).unwrap(), meshes, TriangleRaycaster::new(triangles))
    }

    #[test]
    fn test_flat_ground_scenario() {
        let (pipeline, meshes, ground) = flat_level();
        let progress = BuildProgress::new();
        let data = pipeline.generate(&meshes, &ground, &progress).unwrap();

        assert_eq!(data.index.root_size(), 16.0);
        assert_eq!(data.index.max_level(), 3);
        assert_eq!(progress.phase(), BuildPhase::Done);
        assert!(data.graph.len() > 0);

        let start = Vec3::new(0.0, 5.0, 0.0);
        let end = Vec3::new(0.0, 5.0, 9.0);
        let raw = data.find_path(start, end).unwrap();
        assert_eq!(raw.first(), Some(&start));
        assert_eq!(raw.last(), Some(&end));
        // Level-3 cells are 2 units wide: at most 9 / 2 hops plus the endpoints
        assert!(raw.len() >= 2 && raw.len() <= 6, "raw path {:?}", raw);

        let smoothed = data.smooth(&raw, None);
        assert!(smoothed.len() <= 2);
        assert_eq!(data.plan(start, end, None).unwrap(), smoothed);
    }

    #[test]
    fn test_graph_nodes_are_valid_leaves() {
        let (pipeline, meshes, ground) = flat_level();
        let data = pipeline.generate(&meshes, &ground, &BuildProgress::new()).unwrap();
        for node in data.graph.nodes() {
            let leaf = data.index.get(node.key).unwrap();
            assert!(leaf.is_navigable());
        }
        assert!(data.bounds_stats.collision_leaves > 0);
        assert!(data.bounds_stats.out_of_bounds_leaves > 0);
    }

    #[test]
    fn test_empty_input_yields_root_only() {
        let (pipeline, _, _) = flat_level();
        let nothing = TriangleRaycaster::new(Vec::new());
        let data = pipeline.generate(&[], &nothing, &BuildProgress::new()).unwrap();
        assert_eq!(data.index.len(), 1);
        assert!(data.graph.is_empty());
        assert!(matches!(data.find_path(Vec3::ZERO, Vec3::ONE), Err(PathError::EmptyGraph)));
    }

    #[test]
    fn test_empty_input_over_ground_is_one_node() {
        // The unit root's downward probe reaches the plane below it
        let (pipeline, _, ground) = flat_level();
        let data = pipeline.generate(&[], &ground, &BuildProgress::new()).unwrap();
        assert_eq!(data.index.len(), 1);
        assert_eq!(data.graph.len(), 1);
        assert!(data.graph.contains(NodeKey::ROOT));

        let (start, end) = (Vec3::ZERO, Vec3::ONE);
        assert_eq!(data.find_path(start, end).unwrap(), vec![start, end]);
    }

    #[test]
    fn test_bad_mesh_is_reported_not_fatal() {
        let (pipeline, mut meshes, ground) = flat_level();
        meshes.push(TriangleMesh::new("broken", vec![Vec3::ZERO], vec![0, 1, 2]));
        let data = pipeline.generate(&meshes, &ground, &BuildProgress::new()).unwrap();
        assert_eq!(data.rejected_meshes.len(), 1);
        assert!(data.rejected_meshes[0].contains("broken"));
        assert!(data.graph.len() > 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let (pipeline, meshes, ground) = flat_level();
        let progress = BuildProgress::new();
        progress.cancel();
        let result = pipeline.generate(&meshes, &ground, &progress);
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(progress.phase(), BuildPhase::Cancelled);
    }

    #[test]
    fn test_from_index_matches_build() {
        let (pipeline, meshes, ground) = flat_level();
        let data = pipeline.generate(&meshes, &ground, &BuildProgress::new()).unwrap();
        let rebuilt = NavigationData::from_index((*data.index).clone(), NeighborDirections::FacesAndEdges);
        assert_eq!(rebuilt.graph.len(), data.graph.len());
        assert_eq!(rebuilt.graph.edge_count(), data.graph.edge_count());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = NavConfig { bounds_padding: -1.0, ..Default::default() };
        assert!(NavPipeline::new(config).is_err());
    }

    #[tokio::test]
    async fn test_spawned_build_completes() {
        let (pipeline, meshes, ground) = flat_level();
        let handle = pipeline.spawn(meshes, Arc::new(ground)).unwrap();
        let data = handle.finish().await.unwrap();
        assert!(data.graph.len() > 0);
    }

    #[tokio::test]
    async fn test_spawned_build_cancels() {
        let (pipeline, meshes, _) = flat_level();
        let release = Arc::new(AtomicBool::new(false));
        let gate = Arc::clone(&release);
        let blocking_probe = move |_origin: Vec3, _dir: Vec3, _max: f32| -> Option<RayHit> {
            while !gate.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(1));
            }
            None
        };

        let handle = pipeline.spawn(meshes, Arc::new(blocking_probe)).unwrap();
        handle.cancel();
        release.store(true, Ordering::Relaxed);
        assert!(matches!(handle.finish().await, Err(Error::Cancelled)));
    }

    #[test]
    fn test_blocking_wait() {
        let (pipeline, meshes, ground) = flat_level();
        let handle = pipeline.spawn(meshes, Arc::new(ground)).unwrap();
        let data = handle.wait().unwrap();
        assert_eq!(data.index.max_level(), 3);
    }
}

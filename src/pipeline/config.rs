//! Navigation build configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{Result, Vec3};
use crate::nav::NeighborDirections;
use crate::octree::MAX_LEVEL;

/// Configuration for the navigation build pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Hard cap on subdivision depth (level 6 = 64 cells per side).
    pub max_division_level: u8,
    /// Extent of the smallest agent that must fit through open cells.
    /// The effective max level is the coarser of this and `max_division_level`.
    pub smallest_actor_dimension: Vec3,
    /// Triangle batches voxelized in parallel (0 = one per rayon thread).
    pub batch_count: usize,
    /// Length of the downward ground probe.
    pub ground_probe_distance: f32,
    /// Margin added around the mesh bounds before sizing the root.
    pub bounds_padding: f32,
    pub neighbor_directions: NeighborDirections,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            max_division_level: 6,
            smallest_actor_dimension: Vec3::new(0.5, 1.0, 0.5),
            batch_count: 0,
            ground_probe_distance: 1.0e5,
            bounds_padding: 0.0,
            neighbor_directions: NeighborDirections::FacesAndEdges,
        }
    }
}

impl NavConfig {
    /// Reject values the pipeline cannot build with.
    pub fn validate(&self) -> Result<()> {
        if self.max_division_level > MAX_LEVEL {
            return Err(Error::Config(format!(
                "max_division_level {} exceeds {}",
                self.max_division_level, MAX_LEVEL
            )));
        }
        if !self.smallest_actor_dimension.is_finite() || self.smallest_actor_dimension.cmple(Vec3::ZERO).any() {
            return Err(Error::Config(format!(
                "smallest_actor_dimension {:?} must be positive",
                self.smallest_actor_dimension
            )));
        }
        if !(self.ground_probe_distance > 0.0) {
            return Err(Error::Config(format!(
                "ground_probe_distance {} must be positive",
                self.ground_probe_distance
            )));
        }
        if !(self.bounds_padding >= 0.0) {
            return Err(Error::Config(format!(
                "bounds_padding {} must not be negative",
                self.bounds_padding
            )));
        }
        Ok(())
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }
}

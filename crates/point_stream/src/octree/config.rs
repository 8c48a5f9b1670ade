//! OctreeConfig - split thresholds, point budget and LOD policy.

use serde::Deserialize;

use super::budget::PointBudget;
use crate::constants::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_LEAF_POINTS, DEFAULT_MAX_POINTS_GPU};
use crate::error::{StreamError, StreamResult};

/// Deepest level a config may request. Boxes below this are sub-ulp for
/// any realistic f32 extent.
pub const MAX_SUPPORTED_DEPTH: u32 = 24;

/// How [`super::Octree::collect_lod`] selects points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LodPolicy {
  /// Every point of every leaf, regardless of camera distance.
  #[default]
  Full,
  /// Leaves farther than `full_detail_distance` contribute a prefix of their
  /// points sized `max(min_fraction, full_detail_distance / distance)`.
  DistanceFalloff {
    full_detail_distance: f32,
    min_fraction: f32,
  },
}

/// Configuration for octree construction and traversal.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
  /// A node with at most this many points stays a leaf.
  pub max_leaf_points: usize,

  /// Depth at which nodes stop splitting (root = 0).
  pub max_depth: u32,

  /// Points the index may hold in total.
  pub max_points_gpu: u64,

  pub lod_policy: LodPolicy,
}

impl OctreeConfig {
  #[inline]
  pub fn budget(&self) -> PointBudget {
    PointBudget {
      max_points: self.max_points_gpu,
    }
  }

  pub fn validate(&self) -> StreamResult<()> {
    if self.max_leaf_points == 0 {
      return Err(StreamError::Config("octree.max_leaf_points must be > 0".into()));
    }
    if self.max_depth > MAX_SUPPORTED_DEPTH {
      return Err(StreamError::Config(format!(
        "octree.max_depth {} exceeds {}",
        self.max_depth, MAX_SUPPORTED_DEPTH
      )));
    }
    if let LodPolicy::DistanceFalloff {
      full_detail_distance,
      min_fraction,
    } = self.lod_policy
    {
      if !(full_detail_distance > 0.0) {
        return Err(StreamError::Config(
          "lod_policy.full_detail_distance must be > 0".into(),
        ));
      }
      if !(min_fraction > 0.0 && min_fraction <= 1.0) {
        return Err(StreamError::Config("lod_policy.min_fraction must be in (0, 1]".into()));
      }
    }
    Ok(())
  }
}

impl Default for OctreeConfig {
  fn default() -> Self {
    Self {
      max_leaf_points: DEFAULT_MAX_LEAF_POINTS,
      max_depth: DEFAULT_MAX_DEPTH,
      max_points_gpu: DEFAULT_MAX_POINTS_GPU,
      lod_policy: LodPolicy::Full,
    }
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

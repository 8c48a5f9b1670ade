//! Level-of-detail output of a tree traversal.
//!
//! A traversal yields borrowed, disjoint slices of leaf storage. Renderers
//! may upload them one by one or merge them with [`merge_lod`].

use glam::Vec3;

use super::bounds::Aabb;
use super::config::LodPolicy;
use super::node::NodeId;
use crate::constants::FLOATS_PER_POINT;

/// A run of points selected from one leaf.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodSlice<'a> {
  pub node: NodeId,
  pub positions: &'a [f32],
  /// Same length as `positions`.
  pub colors: &'a [f32],
}

impl LodSlice<'_> {
  #[inline]
  pub fn point_count(&self) -> usize {
    self.positions.len() / FLOATS_PER_POINT
  }
}

/// Owned concatenation of LOD slices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergedPoints {
  pub positions: Vec<f32>,
  pub colors: Vec<f32>,
}

impl MergedPoints {
  pub fn point_count(&self) -> usize {
    self.positions.len() / FLOATS_PER_POINT
  }
}

/// Concatenate slices in order into one position and one color array.
pub fn merge_lod(slices: &[LodSlice<'_>]) -> MergedPoints {
  let floats: usize = slices.iter().map(|s| s.positions.len()).sum();
  let mut merged = MergedPoints {
    positions: Vec::with_capacity(floats),
    colors: Vec::with_capacity(floats),
  };
  for slice in slices {
    merged.positions.extend_from_slice(slice.positions);
    merged.colors.extend_from_slice(slice.colors);
  }
  merged
}

/// Points a leaf contributes under `policy`.
pub(crate) fn leaf_budget(policy: &LodPolicy, bounds: &Aabb, camera: Vec3, count: usize) -> usize {
  match *policy {
    LodPolicy::Full => count,
    LodPolicy::DistanceFalloff {
      full_detail_distance,
      min_fraction,
    } => {
      let distance = bounds.distance_to_point(camera);
      if distance <= full_detail_distance {
        return count;
      }
      let fraction = (full_detail_distance / distance).max(min_fraction).min(1.0);
      ((count as f32 * fraction).ceil() as usize).clamp(1, count)
    }
  }
}

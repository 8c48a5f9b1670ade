//! Arena nodes of the point octree.

use smallvec::SmallVec;

use super::bounds::Aabb;

/// Index of a node in its tree's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
  /// The root of every tree.
  pub const ROOT: NodeId = NodeId(0);

  #[inline]
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

/// One octree node.
///
/// A leaf has no children and owns a contiguous run of points and colors.
/// An internal node has 1..=8 children (empty octants are omitted) and holds
/// no points.
#[derive(Clone, Debug)]
pub struct OctreeNode {
  pub bounds: Aabb,
  /// Root = 0.
  pub depth: u32,
  /// Octant within the parent (bit 0 = +X, bit 1 = +Y, bit 2 = +Z).
  pub octant: u8,
  /// Interleaved xyz.
  pub(crate) points: Vec<f32>,
  /// Interleaved rgb, always the same length as `points`.
  pub(crate) colors: Vec<f32>,
  pub(crate) children: SmallVec<[NodeId; 8]>,
}

impl OctreeNode {
  pub(crate) fn leaf(bounds: Aabb, depth: u32, octant: u8) -> Self {
    Self {
      bounds,
      depth,
      octant,
      points: Vec::new(),
      colors: Vec::new(),
      children: SmallVec::new(),
    }
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    self.children.is_empty()
  }

  #[inline]
  pub fn point_count(&self) -> usize {
    self.points.len() / crate::constants::FLOATS_PER_POINT
  }

  pub fn points(&self) -> &[f32] {
    &self.points
  }

  pub fn colors(&self) -> &[f32] {
    &self.colors
  }

  pub fn children(&self) -> &[NodeId] {
    &self.children
  }
}

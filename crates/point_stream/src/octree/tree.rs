//! Arena octree over streamed points.
//!
//! # Structure
//!
//! ```text
//! nodes: [ root | child | child | grandchild | ... ]     (Vec<OctreeNode>)
//!          │
//!          └── children: SmallVec<[NodeId; 8]>  (non-empty octants only)
//! ```
//!
//! Leaves own their points; internal nodes own none. The tree owns every node
//! and nodes never point back to their parent.
//!
//! # Insertion
//!
//! A tree that was never built keeps everything in its root leaf until the
//! leaf overflows, then builds itself over the accumulated points. A built
//! tree routes new points down to leaves, creating missing octants and
//! splitting leaves that overflow. A chunk that reaches outside the root box
//! rebuilds the whole tree over the union, with the new root box padded by
//! [`GROWTH_SLACK`] so a stream that keeps widening its extent rebuilds a
//! logarithmic number of times rather than once per chunk.
//!
//! Points with a NaN or infinite coordinate are never stored.

use std::borrow::Cow;

use glam::Vec3;

use super::bounds::Aabb;
use super::budget::IndexStats;
use super::config::OctreeConfig;
use super::lod::{leaf_budget, LodSlice};
use super::node::{NodeId, OctreeNode};
use crate::constants::{FLOATS_PER_POINT, GROWTH_SLACK};

/// Point octree with an arena of nodes.
#[derive(Clone, Debug)]
pub struct Octree {
  config: OctreeConfig,
  nodes: Vec<OctreeNode>,
  /// Root bounds are tight around real data.
  built: bool,
  total_points: usize,
  stats: IndexStats,
}

impl Default for Octree {
  fn default() -> Self {
    Self::new(OctreeConfig::default())
  }
}

impl Octree {
  /// Empty tree whose root spans the unbounded box.
  pub fn new(config: OctreeConfig) -> Self {
    Self {
      config,
      nodes: vec![OctreeNode::leaf(Aabb::UNBOUNDED, 0, 0)],
      built: false,
      total_points: 0,
      stats: IndexStats::default(),
    }
  }

  /// Bulk build over interleaved positions and optional colors.
  ///
  /// Missing or mismatched colors are stored as zeros. The root box is
  /// tight around the finite input points.
  #[cfg_attr(feature = "tracing-spans", tracing::instrument(skip_all, name = "octree::build"))]
  pub fn build(positions: &[f32], colors: Option<&[f32]>, config: OctreeConfig) -> Self {
    let mut tree = Self::new(config);
    let positions = whole_points(positions);
    let colors = matched_colors(positions, colors);
    let (positions, colors, dropped) = finite_only(positions, colors);
    tree.stats.non_finite_dropped = dropped;
    if positions.is_empty() {
      return tree;
    }
    tree.build_from(positions.into_owned(), colors, 0.0);
    tree
  }

  /// Add a chunk of points, all or nothing.
  ///
  /// Returns `false` and leaves the tree untouched when the chunk would push
  /// the tree past its point budget.
  #[cfg_attr(feature = "tracing-spans", tracing::instrument(skip_all, name = "octree::insert_chunk"))]
  pub fn insert_chunk(&mut self, positions: &[f32], colors: Option<&[f32]>) -> bool {
    let positions = whole_points(positions);
    let colors = matched_colors(positions, colors);
    let (positions, colors, dropped) = finite_only(positions, colors);
    if dropped > 0 {
      self.stats.non_finite_dropped += dropped;
      tracing::debug!(dropped, "skipping non-finite points");
    }
    let count = positions.len() / FLOATS_PER_POINT;
    if count == 0 {
      return true;
    }

    let budget = self.config.budget();
    if !budget.can_admit(self.total_points as u64, count as u64) {
      self.stats.chunks_rejected += 1;
      self.stats.points_rejected += count as u64;
      tracing::warn!(
        points = count,
        indexed = self.total_points,
        max = budget.max_points,
        "point budget exceeded, chunk rejected"
      );
      return false;
    }

    self.stats.chunks_accepted += 1;

    if !self.built {
      let root = &mut self.nodes[NodeId::ROOT.index()];
      root.points.extend_from_slice(&positions);
      root.colors.extend_from_slice(&colors);
      self.total_points += count;
      if self.total_points > self.config.max_leaf_points {
        self.rebuild();
      }
      return true;
    }

    if !self.bounds().contains_all(&positions) {
      tracing::debug!(points = count, "chunk outside root bounds, rebuilding");
      let (mut all_positions, mut all_colors) = self.gather();
      all_positions.extend_from_slice(&positions);
      all_colors.extend_from_slice(&colors);
      self.build_from(all_positions, all_colors, GROWTH_SLACK);
      self.stats.rebuilds += 1;
      return true;
    }

    self.route(&positions, &colors);
    self.total_points += count;
    true
  }

  /// Rebuild the whole tree over its current points, fitting the root box
  /// tightly again.
  pub fn rebuild(&mut self) {
    let (positions, colors) = self.gather();
    if positions.is_empty() {
      return;
    }
    self.build_from(positions, colors, 0.0);
    self.stats.rebuilds += 1;
  }

  /// Select points for a camera position according to the LOD policy.
  ///
  /// Slices come from leaves in depth-first octant order.
  pub fn collect_lod(&self, camera: Vec3) -> Vec<LodSlice<'_>> {
    self.collect_lod_from(NodeId::ROOT, camera)
  }

  /// Like [`Octree::collect_lod`], starting at `start`.
  pub fn collect_lod_from(&self, start: NodeId, camera: Vec3) -> Vec<LodSlice<'_>> {
    let mut slices = Vec::new();
    if start.index() >= self.nodes.len() {
      return slices;
    }
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
      let node = &self.nodes[id.index()];
      if node.is_leaf() {
        let count = node.point_count();
        if count == 0 {
          continue;
        }
        let keep = leaf_budget(&self.config.lod_policy, &node.bounds, camera, count) * FLOATS_PER_POINT;
        slices.push(LodSlice {
          node: id,
          positions: &node.points[..keep],
          colors: &node.colors[..keep],
        });
      } else {
        stack.extend(node.children.iter().rev().copied());
      }
    }
    slices
  }

  pub fn total_points(&self) -> usize {
    self.total_points
  }

  pub fn node_count(&self) -> usize {
    self.nodes.len()
  }

  pub fn leaf_count(&self) -> usize {
    self.leaves().count()
  }

  /// Leaves in arena order.
  pub fn leaves(&self) -> impl Iterator<Item = (NodeId, &OctreeNode)> + '_ {
    self
      .nodes
      .iter()
      .enumerate()
      .filter(|(_, node)| node.is_leaf())
      .map(|(i, node)| (NodeId(i as u32), node))
  }

  pub fn node(&self, id: NodeId) -> Option<&OctreeNode> {
    self.nodes.get(id.index())
  }

  pub fn root(&self) -> &OctreeNode {
    &self.nodes[NodeId::ROOT.index()]
  }

  pub fn bounds(&self) -> Aabb {
    self.root().bounds
  }

  /// Whether the root box has been fitted to data.
  pub fn is_built(&self) -> bool {
    self.built
  }

  pub fn is_empty(&self) -> bool {
    self.total_points == 0
  }

  pub fn config(&self) -> &OctreeConfig {
    &self.config
  }

  pub fn stats(&self) -> IndexStats {
    self.stats
  }

  /// Replace the arena with a tree built over `positions`. The root box is
  /// padded by `slack` of its largest extent.
  fn build_from(&mut self, positions: Vec<f32>, colors: Vec<f32>, slack: f32) {
    let Some(mut bounds) = Aabb::from_points(&positions) else {
      return;
    };
    if slack > 0.0 {
      bounds = bounds.padded(slack);
    }
    self.total_points = positions.len() / FLOATS_PER_POINT;
    self.nodes.clear();
    self.nodes.push(OctreeNode::leaf(bounds, 0, 0));
    let root = &mut self.nodes[NodeId::ROOT.index()];
    root.points = positions;
    root.colors = colors;
    self.built = true;
    self.split_while_overflowing(NodeId::ROOT);
  }

  /// Split `id` and its new children until every leaf fits or hits max depth.
  fn split_while_overflowing(&mut self, id: NodeId) {
    let mut pending = vec![id];
    while let Some(id) = pending.pop() {
      let node = &self.nodes[id.index()];
      if node.point_count() <= self.config.max_leaf_points || node.depth >= self.config.max_depth {
        continue;
      }
      pending.extend(self.split(id));
    }
  }

  /// Move a leaf's points into new children, one per non-empty octant.
  fn split(&mut self, id: NodeId) -> Vec<NodeId> {
    let node = &mut self.nodes[id.index()];
    let bounds = node.bounds;
    let depth = node.depth + 1;
    let points = std::mem::take(&mut node.points);
    let colors = std::mem::take(&mut node.colors);

    let mut buckets: [(Vec<f32>, Vec<f32>); 8] = Default::default();
    for (p, c) in points
      .chunks_exact(FLOATS_PER_POINT)
      .zip(colors.chunks_exact(FLOATS_PER_POINT))
    {
      let bucket = &mut buckets[bounds.octant_of(Vec3::from_slice(p)) as usize];
      bucket.0.extend_from_slice(p);
      bucket.1.extend_from_slice(c);
    }

    let mut created = Vec::new();
    for (octant, (points, colors)) in buckets.into_iter().enumerate() {
      if points.is_empty() {
        continue;
      }
      let child_id = NodeId(self.nodes.len() as u32);
      let mut child = OctreeNode::leaf(bounds.octant_box(octant as u8), depth, octant as u8);
      child.points = points;
      child.colors = colors;
      self.nodes.push(child);
      self.nodes[id.index()].children.push(child_id);
      created.push(child_id);
    }
    created
  }

  /// Append points to the leaves containing them. All points lie inside the
  /// root box.
  fn route(&mut self, positions: &[f32], colors: &[f32]) {
    let mut touched = Vec::new();
    for (p, c) in positions
      .chunks_exact(FLOATS_PER_POINT)
      .zip(colors.chunks_exact(FLOATS_PER_POINT))
    {
      let point = Vec3::from_slice(p);
      let leaf = self.descend(point);
      let node = &mut self.nodes[leaf.index()];
      node.points.extend_from_slice(p);
      node.colors.extend_from_slice(c);
      touched.push(leaf);
    }

    touched.sort_unstable();
    touched.dedup();
    for leaf in touched {
      let node = &self.nodes[leaf.index()];
      if node.point_count() > self.config.max_leaf_points && node.depth < self.config.max_depth {
        self.split_while_overflowing(leaf);
        self.stats.leaf_splits += 1;
      }
    }
  }

  /// Walk from the root to the leaf whose box holds `point`, creating the
  /// octant leaf if an internal node lacks it.
  fn descend(&mut self, point: Vec3) -> NodeId {
    let mut id = NodeId::ROOT;
    loop {
      let node = &self.nodes[id.index()];
      if node.is_leaf() {
        return id;
      }
      let octant = node.bounds.octant_of(point);
      let existing = node
        .children
        .iter()
        .copied()
        .find(|child| self.nodes[child.index()].octant == octant);
      match existing {
        Some(child) => id = child,
        None => {
          let child = OctreeNode::leaf(node.bounds.octant_box(octant), node.depth + 1, octant);
          let child_id = NodeId(self.nodes.len() as u32);
          self.nodes.push(child);
          self.nodes[id.index()].children.push(child_id);
          return child_id;
        }
      }
    }
  }

  /// Copy every leaf's points out, in leaf order.
  fn gather(&self) -> (Vec<f32>, Vec<f32>) {
    let floats = self.total_points * FLOATS_PER_POINT;
    let mut positions = Vec::with_capacity(floats);
    let mut colors = Vec::with_capacity(floats);
    for (_, leaf) in self.leaves() {
      positions.extend_from_slice(&leaf.points);
      colors.extend_from_slice(&leaf.colors);
    }
    (positions, colors)
  }
}

/// Drop a trailing partial point.
fn whole_points(positions: &[f32]) -> &[f32] {
  &positions[..positions.len() - positions.len() % FLOATS_PER_POINT]
}

/// Drop points with a non-finite coordinate, and their colors.
fn finite_only(positions: &[f32], colors: Vec<f32>) -> (Cow<'_, [f32]>, Vec<f32>, u64) {
  if positions.iter().all(|v| v.is_finite()) {
    return (Cow::Borrowed(positions), colors, 0);
  }
  let mut kept_positions = Vec::with_capacity(positions.len());
  let mut kept_colors = Vec::with_capacity(colors.len());
  for (p, c) in positions
    .chunks_exact(FLOATS_PER_POINT)
    .zip(colors.chunks_exact(FLOATS_PER_POINT))
  {
    if p.iter().all(|v| v.is_finite()) {
      kept_positions.extend_from_slice(p);
      kept_colors.extend_from_slice(c);
    }
  }
  let dropped = ((positions.len() - kept_positions.len()) / FLOATS_PER_POINT) as u64;
  (Cow::Owned(kept_positions), kept_colors, dropped)
}

/// Colors paired with `positions`; zeros when absent or mismatched.
fn matched_colors(positions: &[f32], colors: Option<&[f32]>) -> Vec<f32> {
  match colors {
    Some(colors) if colors.len() >= positions.len() => colors[..positions.len()].to_vec(),
    Some(colors) => {
      tracing::debug!(
        positions = positions.len(),
        colors = colors.len(),
        "color array shorter than positions, storing zeros"
      );
      vec![0.0; positions.len()]
    }
    None => vec![0.0; positions.len()],
  }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;

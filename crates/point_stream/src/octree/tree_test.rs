use super::*;
use crate::octree::LodPolicy;

/// Deterministic scatter inside [-50, 50]^3.
fn scatter(count: usize, seed: u32) -> Vec<f32> {
  let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
  (0..count * 3)
    .map(|_| {
      state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
      (state >> 8) as f32 / (1u32 << 24) as f32 * 100.0 - 50.0
    })
    .collect()
}

fn config(max_leaf_points: usize) -> OctreeConfig {
  OctreeConfig {
    max_leaf_points,
    ..Default::default()
  }
}

/// Points as sortable bit patterns, for multiset comparison.
fn sorted_points(positions: &[f32]) -> Vec<[u32; 3]> {
  let mut points: Vec<[u32; 3]> = positions
    .chunks_exact(3)
    .map(|p| [p[0].to_bits(), p[1].to_bits(), p[2].to_bits()])
    .collect();
  points.sort_unstable();
  points
}

fn leaf_union(tree: &Octree) -> Vec<f32> {
  tree.leaves().flat_map(|(_, leaf)| leaf.points().to_vec()).collect()
}

fn assert_well_formed(tree: &Octree) {
  for (_, leaf) in tree.leaves() {
    assert_eq!(leaf.points().len(), leaf.colors().len());
    assert!(leaf.depth <= tree.config().max_depth);
    for p in leaf.points().chunks_exact(3) {
      assert!(leaf.bounds.contains_point(Vec3::from_slice(p)));
    }
  }
  for id in 0..tree.node_count() {
    let node = tree.node(NodeId(id as u32)).unwrap();
    if !node.is_leaf() {
      assert!(node.points().is_empty());
      assert!(node.children().len() <= 8);
      for child in node.children() {
        let child = tree.node(*child).unwrap();
        assert_eq!(child.depth, node.depth + 1);
        assert!(!child.is_leaf() || child.point_count() > 0, "empty child kept");
      }
    }
  }
}

#[test]
fn test_leaf_union_equals_input_across_sizes() {
  for count in [15, 16, 17, 200] {
    let positions = scatter(count, count as u32);
    let tree = Octree::build(&positions, None, config(16));

    assert_eq!(tree.total_points(), count);
    assert_eq!(sorted_points(&leaf_union(&tree)), sorted_points(&positions));
    assert_well_formed(&tree);
  }
}

#[test]
fn test_small_input_stays_single_leaf() {
  let positions = scatter(16, 3);
  let tree = Octree::build(&positions, None, config(16));
  assert_eq!(tree.node_count(), 1);
  assert!(tree.root().is_leaf());
  assert_eq!(tree.root().points(), positions.as_slice());
}

#[test]
fn test_overflow_splits_root() {
  let tree = Octree::build(&scatter(17, 4), None, config(16));
  assert!(!tree.root().is_leaf());
  assert!(tree.leaf_count() >= 2);
}

#[test]
fn test_center_ties_go_to_lower_octant() {
  // Box [0, 2]^3, center (1, 1, 1).
  let positions = [0.0, 0.0, 0.0, 2.0, 2.0, 2.0, 1.0, 1.0, 1.0];
  let tree = Octree::build(&positions, None, config(2));

  let root = tree.root();
  let octants: Vec<u8> = root
    .children()
    .iter()
    .map(|id| tree.node(*id).unwrap().octant)
    .collect();
  assert_eq!(octants, vec![0, 7]);

  let low = tree.node(root.children()[0]).unwrap();
  assert!(sorted_points(low.points()).contains(&[1.0f32.to_bits(); 3]));
}

#[test]
fn test_duplicates_stop_at_max_depth() {
  let positions: Vec<f32> = std::iter::repeat([1.0, 2.0, 3.0]).take(10).flatten().collect();
  let mut with_spread = positions.clone();
  with_spread.extend_from_slice(&[-8.0, -8.0, -8.0]);
  let tree = Octree::build(
    &with_spread,
    None,
    OctreeConfig {
      max_leaf_points: 2,
      max_depth: 3,
      ..Default::default()
    },
  );

  assert_eq!(tree.total_points(), 11);
  let deepest = tree.leaves().map(|(_, leaf)| leaf.depth).max().unwrap();
  assert_eq!(deepest, 3);
  assert_well_formed(&tree);
}

#[test]
fn test_missing_colors_stored_as_zeros() {
  let tree = Octree::build(&scatter(5, 1), None, config(16));
  assert!(tree.root().colors().iter().all(|&c| c == 0.0));
  assert_eq!(tree.root().colors().len(), 15);
}

#[test]
fn test_colors_follow_their_points() {
  let positions = scatter(40, 9);
  // Color each point with its own x coordinate.
  let colors: Vec<f32> = positions.chunks_exact(3).flat_map(|p| [p[0]; 3]).collect();
  let tree = Octree::build(&positions, Some(&colors), config(4));

  for (_, leaf) in tree.leaves() {
    for (p, c) in leaf.points().chunks_exact(3).zip(leaf.colors().chunks_exact(3)) {
      assert_eq!(c, &[p[0]; 3]);
    }
  }
}

#[test]
fn test_collect_lod_covers_every_point() {
  let positions = scatter(300, 11);
  let tree = Octree::build(&positions, None, config(8));

  let slices = tree.collect_lod(Vec3::new(1000.0, 0.0, 0.0));
  let total: usize = slices.iter().map(LodSlice::point_count).sum();
  assert_eq!(total, tree.total_points());

  let merged = crate::octree::merge_lod(&slices);
  assert_eq!(sorted_points(&merged.positions), sorted_points(&positions));
}

#[test]
fn test_collect_lod_slices_are_disjoint_leaves() {
  let tree = Octree::build(&scatter(100, 2), None, config(8));
  let slices = tree.collect_lod(Vec3::ZERO);
  let mut nodes: Vec<NodeId> = slices.iter().map(|s| s.node).collect();
  let before = nodes.len();
  nodes.dedup();
  assert_eq!(nodes.len(), before);
  for slice in &slices {
    assert!(tree.node(slice.node).unwrap().is_leaf());
  }
}

#[test]
fn test_distance_falloff_thins_far_leaves() {
  let positions = scatter(400, 5);
  let tree = Octree::build(
    &positions,
    None,
    OctreeConfig {
      max_leaf_points: 50,
      lod_policy: LodPolicy::DistanceFalloff {
        full_detail_distance: 10.0,
        min_fraction: 0.25,
      },
      ..Default::default()
    },
  );

  let near: usize = tree.collect_lod(Vec3::ZERO).iter().map(LodSlice::point_count).sum();
  let far: usize = tree
    .collect_lod(Vec3::splat(10_000.0))
    .iter()
    .map(LodSlice::point_count)
    .sum();
  assert!(near > far);
  assert!(far >= 100);
  assert!(far < 400);
}

#[test]
fn test_collect_lod_from_subtree() {
  let tree = Octree::build(&scatter(100, 6), None, config(8));
  let child = tree.root().children()[0];
  let sub: usize = tree
    .collect_lod_from(child, Vec3::ZERO)
    .iter()
    .map(LodSlice::point_count)
    .sum();
  assert!(sub > 0 && sub < 100);
  assert!(tree.collect_lod_from(NodeId(10_000), Vec3::ZERO).is_empty());
}

#[test]
fn test_fresh_tree_appends_to_root() {
  let mut tree = Octree::new(config(16));
  assert!(tree.insert_chunk(&scatter(5, 1), None));
  assert!(tree.insert_chunk(&scatter(5, 2), None));

  assert!(!tree.is_built());
  assert!(tree.root().is_leaf());
  assert_eq!(tree.root().point_count(), 10);
  assert_eq!(tree.bounds(), Aabb::UNBOUNDED);
  assert_eq!(tree.stats().chunks_accepted, 2);
}

#[test]
fn test_fresh_tree_builds_once_root_overflows() {
  let mut tree = Octree::new(config(16));
  tree.insert_chunk(&scatter(10, 1), None);
  tree.insert_chunk(&scatter(10, 2), None);

  assert!(tree.is_built());
  assert_eq!(tree.total_points(), 20);
  assert!(tree.leaf_count() > 1);
  assert_eq!(tree.stats().rebuilds, 1);
  assert_well_formed(&tree);
}

#[test]
fn test_budget_rejection_is_all_or_nothing() {
  let mut tree = Octree::new(OctreeConfig {
    max_points_gpu: 10,
    ..Default::default()
  });
  assert!(tree.insert_chunk(&scatter(6, 1), None));
  assert!(!tree.insert_chunk(&scatter(5, 2), None));

  assert_eq!(tree.total_points(), 6);
  assert_eq!(leaf_union(&tree).len(), 18);
  let stats = tree.stats();
  assert_eq!(stats.chunks_rejected, 1);
  assert_eq!(stats.points_rejected, 5);

  // Exactly at the budget is fine.
  assert!(tree.insert_chunk(&scatter(4, 3), None));
  assert_eq!(tree.total_points(), 10);
}

#[test]
fn test_insert_inside_bounds_routes_without_rebuild() {
  let mut tree = Octree::build(&scatter(200, 7), None, config(16));
  let nodes_before = tree.node_count();
  let bounds = tree.bounds();

  let inside: Vec<f32> = scatter(50, 8)
    .chunks_exact(3)
    .filter(|p| bounds.contains_point(Vec3::from_slice(p)))
    .flatten()
    .copied()
    .collect();
  let added = inside.len() / 3;
  assert!(tree.insert_chunk(&inside, None));

  assert_eq!(tree.stats().rebuilds, 0);
  assert_eq!(tree.bounds(), bounds);
  assert_eq!(tree.total_points(), 200 + added);
  assert_eq!(leaf_union(&tree).len(), (200 + added) * 3);
  assert!(tree.node_count() >= nodes_before);
  assert_well_formed(&tree);
}

#[test]
fn test_insert_outside_bounds_rebuilds_over_union() {
  let original = scatter(100, 7);
  let mut tree = Octree::build(&original, None, config(16));
  let far = [500.0, 500.0, 500.0, 501.0, 499.0, 500.0];

  assert!(tree.insert_chunk(&far, None));
  assert_eq!(tree.stats().rebuilds, 1);
  assert!(tree.bounds().contains_point(Vec3::splat(500.0)));

  let mut expected = original.clone();
  expected.extend_from_slice(&far);
  assert_eq!(sorted_points(&leaf_union(&tree)), sorted_points(&expected));
  assert_well_formed(&tree);
}

#[test]
fn test_routing_splits_overflowing_leaf() {
  let mut tree = Octree::build(&scatter(16, 1), None, config(16));
  assert!(tree.root().is_leaf());

  let inside: Vec<f32> = tree.root().points()[..12].to_vec();
  assert!(tree.insert_chunk(&inside, None));

  assert!(!tree.root().is_leaf());
  assert_eq!(tree.stats().leaf_splits, 1);
  assert_eq!(tree.total_points(), 20);
  assert_well_formed(&tree);
}

#[test]
fn test_rebuild_keeps_points() {
  let positions = scatter(60, 12);
  let mut tree = Octree::build(&positions, None, config(8));
  tree.rebuild();
  assert_eq!(tree.stats().rebuilds, 1);
  assert_eq!(sorted_points(&leaf_union(&tree)), sorted_points(&positions));
}

#[test]
fn test_empty_build() {
  let tree = Octree::build(&[], None, OctreeConfig::default());
  assert!(tree.is_empty());
  assert!(!tree.is_built());
  assert!(tree.collect_lod(Vec3::ZERO).is_empty());
}

#[test]
fn test_sweeping_stream_rebuilds_rarely() {
  let mut tree = Octree::new(config(100));
  for i in 0..50 {
    // 200 points in [i, i + 1) x [0, 1) x [0, 1).
    let chunk: Vec<f32> = scatter(200, i)
      .chunks_exact(3)
      .flat_map(|p| {
        let unit = |v: f32| (v + 50.0) / 100.0;
        [i as f32 + unit(p[0]), unit(p[1]), unit(p[2])]
      })
      .collect();
    assert!(tree.insert_chunk(&chunk, None));
  }

  assert_eq!(tree.total_points(), 10_000);
  assert_eq!(tree.stats().chunks_accepted, 50);
  assert!(tree.stats().rebuilds <= 12, "rebuilds = {}", tree.stats().rebuilds);
  assert!(tree.bounds().contains_point(Vec3::new(49.5, 0.5, 0.5)));
  assert_well_formed(&tree);
}

#[test]
fn test_non_finite_points_are_skipped() {
  let mut positions = scatter(40, 13);
  positions.extend_from_slice(&[f32::INFINITY, 0.0, 0.0, 1.0, f32::NAN, 1.0]);
  let tree = Octree::build(&positions, None, config(4));

  assert_eq!(tree.total_points(), 40);
  assert_eq!(tree.stats().non_finite_dropped, 2);
  assert!(tree.bounds().center().is_finite());
  assert!(tree.leaves().all(|(_, leaf)| leaf.depth < tree.config().max_depth));
  assert_well_formed(&tree);

  let mut tree = tree;
  let inside = tree.root().bounds.center().to_array();
  let chunk = [inside[0], inside[1], inside[2], f32::NEG_INFINITY, 0.0, 0.0];
  assert!(tree.insert_chunk(&chunk, None));
  assert_eq!(tree.total_points(), 41);
  assert_eq!(tree.stats().rebuilds, 0);
  assert_eq!(tree.stats().non_finite_dropped, 3);
}

//! Octree spatial index for streamed points.
//!
//! Nodes live in an arena (`Vec<OctreeNode>`) addressed by [`NodeId`]. A node
//! is split at its center into up to eight octants once it holds more than
//! `max_leaf_points` points, down to `max_depth`.
//!
//! # Octant convention
//!
//! ```text
//! octant = (x > cx) | (y > cy) << 1 | (z > cz) << 2
//! ```
//!
//! A coordinate equal to the center belongs to the lower half, so every point
//! lands in exactly one octant.
//!
//! # Module Structure
//!
//! - [`bounds`]: `Aabb` with octant math
//! - [`config`]: `OctreeConfig`, `LodPolicy`
//! - [`budget`]: `PointBudget` admission and `IndexStats`
//! - [`node`]: `OctreeNode`, `NodeId`
//! - [`tree`]: `Octree` build / insert / traversal
//! - [`lod`]: `LodSlice` output and `merge_lod`
//! - [`async_build`]: rebuild on the rayon pool

pub mod async_build;
pub mod bounds;
pub mod budget;
pub mod config;
pub mod lod;
pub mod node;
pub mod tree;

// Re-exports
pub use async_build::{AsyncIndexBuilder, BuildRequest};
pub use bounds::Aabb;
pub use budget::{IndexStats, PointBudget};
pub use config::{LodPolicy, OctreeConfig};
pub use lod::{merge_lod, LodSlice, MergedPoints};
pub use node::{NodeId, OctreeNode};
pub use tree::Octree;

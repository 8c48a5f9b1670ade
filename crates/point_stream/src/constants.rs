//! Wire-format sizes and default tuning values.
//!
//! # Frame layout
//!
//! ```text
//! ┌──────────┬────────────────┬──────────────────────┬────────────────────┐
//! │ L: u32BE │ L bytes JSON   │ n * 12 bytes f32 LE  │ colors (optional)  │
//! │          │ ChunkMeta      │ positions xyzxyz...  │ n * 6  (u16 LE)    │
//! │          │                │                      │ n * 12 (f32 LE)    │
//! └──────────┴────────────────┴──────────────────────┴────────────────────┘
//! ```

/// Size of the big-endian metadata length prefix.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Floats per point (x, y, z / r, g, b).
pub const FLOATS_PER_POINT: usize = 3;

/// Bytes of position payload per point.
pub const POSITION_BYTES_PER_POINT: usize = FLOATS_PER_POINT * 4;

/// Bytes of color payload per point with u16 channels.
pub const COLOR_U16_BYTES_PER_POINT: usize = FLOATS_PER_POINT * 2;

/// Bytes of color payload per point with f32 channels.
pub const COLOR_F32_BYTES_PER_POINT: usize = FLOATS_PER_POINT * 4;

/// Divisor normalizing u16 color channels to 0..1.
pub const COLOR_U16_SCALE: f32 = 65535.0;

/// Divisor applied to f32 color channels given in 0..255.
pub const COLOR_U8_RANGE_SCALE: f32 = 255.0;

/// Largest metadata blob accepted before the stream is considered
/// desynchronized.
pub const DEFAULT_MAX_META_LEN: usize = 64 * 1024;

/// Largest point count a single frame may declare.
pub const DEFAULT_MAX_POINTS_PER_CHUNK: u32 = 10_000_000;

/// Minimum initial pool capacity, in points.
pub const DEFAULT_INITIAL_POOL_POINTS: usize = 200_000;

/// Leaf split threshold for the octree.
pub const DEFAULT_MAX_LEAF_POINTS: usize = 100_000;

/// Maximum octree depth (root = depth 0).
pub const DEFAULT_MAX_DEPTH: u32 = 8;

/// Global point budget of the index.
pub const DEFAULT_MAX_POINTS_GPU: u64 = 5_000_000;

/// Pending chunk count at which the producer is paused.
pub const DEFAULT_HIGH_WATERMARK: u32 = 5;

/// Chunks moved from the ingest queue into pools per tick.
pub const DEFAULT_INGEST_BATCH: usize = 4;

/// Margin added around the root box when out-of-bounds points force a
/// rebuild, as a fraction of the box's largest extent.
pub const GROWTH_SLACK: f32 = 0.5;

/// Half-extent of the root box of a tree that has not been built yet.
pub const UNBOUNDED_EXTENT: f32 = 1e9;

/// Byte stride of one record in a preprocessed tile (xyz + rgb, all f32).
pub const TILE_RECORD_BYTES: usize = 6 * 4;

#[cfg(test)]
#[path = "constants_test.rs"]
mod constants_test;

//! Preprocessed tile datasets.
//!
//! A dataset is a `metadata.json` plus one binary file per tile. Tile files
//! hold interleaved records of six little-endian f32 (`x y z r g b`), with
//! positions relative to the tile origin and colors in 0..65535.
//!
//! Decoded tiles become ordinary [`Chunk`]s, recentered on the dataset's
//! global origin (the center of its bounds), so they share the pool and index
//! path with streamed chunks.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::constants::{COLOR_U16_SCALE, TILE_RECORD_BYTES};
use crate::error::{StreamError, StreamResult};
use crate::types::{Chunk, ChunkMeta, ColorEncoding};

/// Per-tile entry of the dataset metadata.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct TileMeta {
  #[serde(default)]
  pub tx: Option<i64>,
  #[serde(default)]
  pub ty: Option<i64>,
  /// World position of the tile's local zero. Required to place the tile.
  #[serde(default)]
  pub origin: Option<[f64; 3]>,
  #[serde(default, alias = "points")]
  pub point_count: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct DatasetBounds {
  pub min: [f64; 3],
  pub max: [f64; 3],
}

/// Contents of a dataset's `metadata.json`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DatasetMetadata {
  #[serde(default)]
  pub version: Option<serde_json::Value>,
  #[serde(default)]
  pub tile_size: Option<f64>,
  pub bounds: DatasetBounds,
  #[serde(default)]
  pub total_points: Option<u64>,
  #[serde(default)]
  pub tiles: BTreeMap<String, TileMeta>,
}

impl DatasetMetadata {
  pub fn from_json(text: &str) -> StreamResult<Self> {
    serde_json::from_str(text).map_err(|err| StreamError::Schema(format!("dataset metadata: {err}")))
  }

  /// Center of the dataset bounds. Every decoded tile is expressed relative
  /// to this point.
  pub fn global_origin(&self) -> [f64; 3] {
    let DatasetBounds { min, max } = self.bounds;
    [
      (min[0] + max[0]) * 0.5,
      (min[1] + max[1]) * 0.5,
      (min[2] + max[2]) * 0.5,
    ]
  }

  /// Ids of tiles whose origin lies in the XY box, bounds inclusive, sorted.
  ///
  /// Tiles without an origin never match.
  pub fn query_tiles(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<String> {
    self
      .tiles
      .iter()
      .filter(|(_, tile)| {
        tile.origin.is_some_and(|[ox, oy, _]| {
          (min_x..=max_x).contains(&ox) && (min_y..=max_y).contains(&oy)
        })
      })
      .map(|(id, _)| id.clone())
      .collect()
  }

  pub fn tile(&self, id: &str) -> Option<&TileMeta> {
    self.tiles.get(id)
  }

  /// Decode a tile of this dataset against its global origin.
  pub fn decode_tile(&self, id: &str, bytes: &[u8]) -> StreamResult<Chunk> {
    let meta = self
      .tile(id)
      .ok_or_else(|| StreamError::Schema(format!("tile '{id}' is not in the dataset")))?;
    decode_tile(id, bytes, meta, self.global_origin())
  }
}

/// Decode one tile file into a chunk recentered on `global_origin`.
///
/// Positions are computed in f64 as `local + tile_origin - global_origin`
/// before narrowing to f32.
pub fn decode_tile(id: &str, bytes: &[u8], meta: &TileMeta, global_origin: [f64; 3]) -> StreamResult<Chunk> {
  let origin = meta
    .origin
    .ok_or_else(|| StreamError::MissingOrigin(id.to_string()))?;
  if bytes.len() % TILE_RECORD_BYTES != 0 {
    return Err(StreamError::Framing(format!(
      "tile '{id}' is {} bytes, not a multiple of {TILE_RECORD_BYTES}",
      bytes.len()
    )));
  }

  let count = bytes.len() / TILE_RECORD_BYTES;
  if let Some(expected) = meta.point_count {
    if expected != count as u64 {
      tracing::warn!(tile = id, expected, actual = count, "tile point count differs from metadata");
    }
  }

  let shift = [
    origin[0] - global_origin[0],
    origin[1] - global_origin[1],
    origin[2] - global_origin[2],
  ];
  let mut positions = Vec::with_capacity(count * 3);
  let mut colors = Vec::with_capacity(count * 3);
  for record in bytes.chunks_exact(TILE_RECORD_BYTES) {
    let field = |i: usize| f32::from_le_bytes([record[i * 4], record[i * 4 + 1], record[i * 4 + 2], record[i * 4 + 3]]);
    for axis in 0..3 {
      positions.push((field(axis) as f64 + shift[axis]) as f32);
    }
    for channel in 3..6 {
      colors.push(field(channel) / COLOR_U16_SCALE);
    }
  }

  let chunk_meta = ChunkMeta {
    total_points_hint: count as u32,
    ..ChunkMeta::new(id, 0, count as u32).with_color(ColorEncoding::F32)
  };
  Chunk::new(chunk_meta, positions, Some(colors))
}

#[cfg(test)]
#[path = "tile_test.rs"]
mod tile_test;

//! Core data types shared by the decoder, pools and index.

use serde::{Deserialize, Serialize};

use crate::constants::{
  COLOR_F32_BYTES_PER_POINT, COLOR_U16_BYTES_PER_POINT, FLOATS_PER_POINT,
  POSITION_BYTES_PER_POINT,
};
use crate::error::{StreamError, StreamResult};

/// How the color payload of a frame is encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorEncoding {
  /// Three u16 channels per point, normalized by 65535.
  #[default]
  U16,
  /// Three f32 channels per point, either 0..1 or 0..255.
  F32,
}

impl ColorEncoding {
  /// Payload bytes per point for this encoding.
  #[inline]
  pub fn bytes_per_point(self) -> usize {
    match self {
      ColorEncoding::U16 => COLOR_U16_BYTES_PER_POINT,
      ColorEncoding::F32 => COLOR_F32_BYTES_PER_POINT,
    }
  }
}

/// Per-frame metadata, carried as JSON in front of the binary payload.
///
/// Field aliases accept the names older producers emit (`file_name`,
/// `start`, `count`, `total_points`, `colors`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkMeta {
  /// Logical source (file or tile) the chunk belongs to.
  #[serde(alias = "file_name", alias = "file")]
  pub source_id: String,
  /// Offset of the first point within the source's stream.
  #[serde(alias = "start")]
  pub start_offset: u64,
  /// Points carried by this frame.
  #[serde(alias = "count")]
  pub point_count: u32,
  /// Total points the producer expects for the source (0 = unknown).
  #[serde(default, alias = "total_points")]
  pub total_points_hint: u32,
  /// Whether a color payload follows the positions.
  #[serde(default, alias = "colors")]
  pub has_color: bool,
  /// Encoding of the color payload.
  #[serde(default)]
  pub color_encoding: ColorEncoding,
}

impl ChunkMeta {
  /// Metadata for a colorless chunk.
  pub fn new(source_id: impl Into<String>, start_offset: u64, point_count: u32) -> Self {
    Self {
      source_id: source_id.into(),
      start_offset,
      point_count,
      total_points_hint: 0,
      has_color: false,
      color_encoding: ColorEncoding::U16,
    }
  }

  /// Builder-style toggle for the color payload.
  pub fn with_color(mut self, encoding: ColorEncoding) -> Self {
    self.has_color = true;
    self.color_encoding = encoding;
    self
  }

  /// Bytes of position payload following the metadata.
  #[inline]
  pub fn position_bytes(&self) -> usize {
    self.point_count as usize * POSITION_BYTES_PER_POINT
  }

  /// Bytes of color payload following the positions (0 without color).
  #[inline]
  pub fn color_bytes(&self) -> usize {
    if self.has_color {
      self.point_count as usize * self.color_encoding.bytes_per_point()
    } else {
      0
    }
  }

  /// Total binary payload after the metadata blob.
  #[inline]
  pub fn payload_bytes(&self) -> usize {
    self.position_bytes() + self.color_bytes()
  }
}

/// One decoded unit of streamed point data.
///
/// Immutable once built: colors are normalized to 0..1 at construction and
/// both arrays are validated against `meta.point_count`.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
  meta: ChunkMeta,
  positions: Vec<f32>,
  colors: Option<Vec<f32>>,
}

impl Chunk {
  /// Build a chunk, checking the array lengths against the metadata.
  pub fn new(meta: ChunkMeta, positions: Vec<f32>, colors: Option<Vec<f32>>) -> StreamResult<Self> {
    if meta.point_count == 0 {
      return Err(StreamError::Schema(format!(
        "chunk for '{}' declares zero points",
        meta.source_id
      )));
    }
    let expected = meta.point_count as usize * FLOATS_PER_POINT;
    if positions.len() != expected {
      return Err(StreamError::Schema(format!(
        "chunk for '{}' has {} position floats, expected {}",
        meta.source_id,
        positions.len(),
        expected
      )));
    }
    if let Some(colors) = &colors {
      if colors.len() != expected {
        return Err(StreamError::Schema(format!(
          "chunk for '{}' has {} color floats, expected {}",
          meta.source_id,
          colors.len(),
          expected
        )));
      }
    }
    Ok(Self {
      meta,
      positions,
      colors,
    })
  }

  pub fn meta(&self) -> &ChunkMeta {
    &self.meta
  }

  pub fn source_id(&self) -> &str {
    &self.meta.source_id
  }

  pub fn point_count(&self) -> usize {
    self.meta.point_count as usize
  }

  /// Interleaved xyz positions.
  pub fn positions(&self) -> &[f32] {
    &self.positions
  }

  /// Interleaved rgb colors in 0..1, if the frame carried them.
  pub fn colors(&self) -> Option<&[f32]> {
    self.colors.as_deref()
  }

  /// Split into metadata and owned arrays.
  pub fn into_parts(self) -> (ChunkMeta, Vec<f32>, Option<Vec<f32>>) {
    (self.meta, self.positions, self.colors)
  }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

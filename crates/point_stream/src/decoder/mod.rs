//! Frame decoder for the length-prefixed chunk protocol.
//!
//! Bytes arrive in arbitrary fragments. The decoder keeps an accumulation
//! buffer and a cursor, and emits a [`Chunk`] only once its whole frame is
//! buffered. Decoding a stream in one call or split at any byte boundary
//! yields the same ordered sequence of chunks.
//!
//! # Failure handling
//!
//! A frame whose metadata cannot be parsed is skipped by advancing past the
//! declared metadata length, so the stream stays in sync. Metadata that is
//! valid JSON but misses required fields is a schema error and is skipped the
//! same way. Both are counted in [`DecoderStats`].
//!
//! A length prefix above `max_meta_len` cannot be trusted to locate the next
//! frame. Only those four bytes are skipped and decoding resumes right after
//! them, so the outcome never depends on where fragments were split.

pub mod control;

use serde::Deserialize;
use serde_json::error::Category;

use crate::constants::{
  COLOR_U16_SCALE, COLOR_U8_RANGE_SCALE, DEFAULT_MAX_META_LEN, DEFAULT_MAX_POINTS_PER_CHUNK,
  FLOATS_PER_POINT, LENGTH_PREFIX_BYTES,
};
use crate::error::{StreamError, StreamResult};
use crate::types::{Chunk, ChunkMeta, ColorEncoding};

pub use control::{parse_control, ControlMessage};

/// Decoder tuning.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
  /// Largest metadata length accepted. A larger prefix means the stream
  /// lost sync; the prefix is skipped.
  pub max_meta_len: usize,
  /// Largest `point_count` a frame may declare. Larger frames are schema
  /// errors and their payload is never awaited.
  pub max_points_per_chunk: u32,
  /// Drop points with NaN or infinite coordinates when building chunks.
  pub filter_non_finite: bool,
}

impl Default for DecoderConfig {
  fn default() -> Self {
    Self {
      max_meta_len: DEFAULT_MAX_META_LEN,
      max_points_per_chunk: DEFAULT_MAX_POINTS_PER_CHUNK,
      filter_non_finite: false,
    }
  }
}

/// Counters kept by a [`FrameDecoder`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecoderStats {
  /// Bytes handed to [`FrameDecoder::push`].
  pub bytes_received: u64,
  /// Chunks emitted.
  pub frames_decoded: u64,
  /// Points across emitted chunks.
  pub points_decoded: u64,
  /// Frames dropped for malformed metadata or an oversized length prefix.
  pub framing_errors: u64,
  /// Frames dropped for missing or invalid metadata fields.
  pub schema_errors: u64,
  /// Length prefixes skipped for exceeding `max_meta_len`.
  pub desyncs: u64,
  /// Bytes thrown away by desyncs and resets.
  pub discarded_bytes: u64,
  /// Points removed by the non-finite filter.
  pub non_finite_points_dropped: u64,
}

/// Incremental decoder over an append-only byte stream.
pub struct FrameDecoder {
  config: DecoderConfig,
  /// Accumulated bytes; `buffer[cursor..]` is still undecoded.
  buffer: Vec<u8>,
  cursor: usize,
  /// Metadata of the frame at `cursor`, parsed while its payload is pending.
  pending_meta: Option<ChunkMeta>,
  stats: DecoderStats,
}

impl Default for FrameDecoder {
  fn default() -> Self {
    Self::new(DecoderConfig::default())
  }
}

impl FrameDecoder {
  pub fn new(config: DecoderConfig) -> Self {
    Self {
      config,
      buffer: Vec::new(),
      cursor: 0,
      pending_meta: None,
      stats: DecoderStats::default(),
    }
  }

  /// Append a fragment and return every chunk it completes, in stream order.
  #[cfg_attr(feature = "tracing-spans", tracing::instrument(skip_all, name = "decoder::push"))]
  pub fn push(&mut self, fragment: &[u8]) -> Vec<Chunk> {
    self.stats.bytes_received += fragment.len() as u64;
    self.compact();
    self.buffer.extend_from_slice(fragment);

    let mut chunks = Vec::new();
    loop {
      let available = &self.buffer[self.cursor..];
      if available.len() < LENGTH_PREFIX_BYTES {
        break;
      }

      let meta_len = u32::from_be_bytes([available[0], available[1], available[2], available[3]]) as usize;
      if meta_len > self.config.max_meta_len {
        tracing::error!(
          meta_len,
          max = self.config.max_meta_len,
          "metadata length exceeds limit, skipping length prefix"
        );
        self.stats.framing_errors += 1;
        self.stats.desyncs += 1;
        self.stats.discarded_bytes += LENGTH_PREFIX_BYTES as u64;
        self.cursor += LENGTH_PREFIX_BYTES;
        continue;
      }

      let header_len = LENGTH_PREFIX_BYTES + meta_len;
      if available.len() < header_len {
        break;
      }

      let meta = match self.pending_meta.take() {
        Some(meta) => meta,
        None => match serde_json::from_slice::<ChunkMeta>(&available[LENGTH_PREFIX_BYTES..header_len]) {
          Ok(meta) if meta.point_count > self.config.max_points_per_chunk => {
            tracing::warn!(
              source = %meta.source_id,
              points = meta.point_count,
              max = self.config.max_points_per_chunk,
              "dropping frame declaring too many points"
            );
            self.stats.schema_errors += 1;
            self.cursor += header_len;
            continue;
          }
          Ok(meta) => meta,
          Err(err) => {
            if err.classify() == Category::Data {
              tracing::warn!(meta_len, error = %err, "dropping frame with incomplete metadata");
              self.stats.schema_errors += 1;
            } else {
              tracing::error!(meta_len, error = %err, "dropping frame with malformed metadata");
              self.stats.framing_errors += 1;
            }
            self.cursor += header_len;
            continue;
          }
        },
      };

      let frame_len = header_len + meta.payload_bytes();
      if available.len() < frame_len {
        self.pending_meta = Some(meta);
        break;
      }

      let payload = &available[header_len..frame_len];
      let built = build_chunk(meta, payload, &self.config);
      self.cursor += frame_len;

      match built {
        Ok((chunk, dropped)) => {
          self.stats.non_finite_points_dropped += dropped;
          self.stats.frames_decoded += 1;
          self.stats.points_decoded += chunk.point_count() as u64;
          chunks.push(chunk);
        }
        Err(err) => {
          tracing::warn!(error = %err, "dropping frame");
          self.stats.schema_errors += 1;
        }
      }
    }

    chunks
  }

  /// Bytes buffered but not yet decoded into a chunk.
  pub fn buffered_len(&self) -> usize {
    self.buffer.len() - self.cursor
  }

  /// Discard any partially buffered frame. Returns the bytes thrown away.
  pub fn reset(&mut self) -> usize {
    let discarded = self.buffered_len();
    if discarded > 0 {
      tracing::warn!(bytes = discarded, "discarding partially buffered frame");
    }
    self.stats.discarded_bytes += discarded as u64;
    self.buffer.clear();
    self.cursor = 0;
    self.pending_meta = None;
    discarded
  }

  pub fn stats(&self) -> DecoderStats {
    self.stats
  }

  pub fn config(&self) -> &DecoderConfig {
    &self.config
  }

  /// Drop consumed bytes once they dominate the buffer.
  fn compact(&mut self) {
    if self.cursor == 0 {
      return;
    }
    if self.cursor == self.buffer.len() {
      self.buffer.clear();
      self.cursor = 0;
    } else if self.cursor * 2 >= self.buffer.len() {
      self.buffer.drain(..self.cursor);
      self.cursor = 0;
    }
  }
}

/// Decode positions and colors for a complete frame payload.
///
/// Returns the chunk and the number of non-finite points filtered out.
fn build_chunk(mut meta: ChunkMeta, payload: &[u8], config: &DecoderConfig) -> StreamResult<(Chunk, u64)> {
  let position_bytes = meta.position_bytes();
  let mut positions = decode_f32_le(&payload[..position_bytes]);
  let mut colors = if meta.has_color {
    let raw = &payload[position_bytes..];
    Some(match meta.color_encoding {
      ColorEncoding::U16 => decode_u16_colors(raw),
      ColorEncoding::F32 => decode_f32_colors(raw),
    })
  } else {
    None
  };

  let mut dropped = 0u64;
  if config.filter_non_finite {
    dropped = retain_finite(&mut positions, colors.as_mut());
    if dropped > 0 {
      tracing::debug!(source = %meta.source_id, dropped, "filtered non-finite points");
      meta.point_count -= dropped as u32;
      if meta.point_count == 0 {
        return Err(StreamError::Schema(format!(
          "chunk for '{}' has no finite points",
          meta.source_id
        )));
      }
    }
  }

  Chunk::new(meta, positions, colors).map(|chunk| (chunk, dropped))
}

fn decode_f32_le(bytes: &[u8]) -> Vec<f32> {
  bytes
    .chunks_exact(4)
    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    .collect()
}

fn decode_u16_colors(bytes: &[u8]) -> Vec<f32> {
  bytes
    .chunks_exact(2)
    .map(|b| u16::from_le_bytes([b[0], b[1]]) as f32 / COLOR_U16_SCALE)
    .collect()
}

/// f32 colors are either already 0..1 or 0..255; a point with any channel
/// above 1.0 is treated as 0..255.
fn decode_f32_colors(bytes: &[u8]) -> Vec<f32> {
  let mut colors = decode_f32_le(bytes);
  for rgb in colors.chunks_exact_mut(FLOATS_PER_POINT) {
    if rgb.iter().any(|&c| c > 1.0) {
      for c in rgb.iter_mut() {
        *c /= COLOR_U8_RANGE_SCALE;
      }
    }
  }
  colors
}

/// Compact out points with a non-finite coordinate, keeping colors aligned.
fn retain_finite(positions: &mut Vec<f32>, mut colors: Option<&mut Vec<f32>>) -> u64 {
  let count = positions.len() / FLOATS_PER_POINT;
  let mut write = 0;
  for read in 0..count {
    let src = read * FLOATS_PER_POINT;
    if !positions[src..src + FLOATS_PER_POINT].iter().all(|v| v.is_finite()) {
      continue;
    }
    if write != read {
      let dst = write * FLOATS_PER_POINT;
      positions.copy_within(src..src + FLOATS_PER_POINT, dst);
      if let Some(colors) = colors.as_deref_mut() {
        colors.copy_within(src..src + FLOATS_PER_POINT, dst);
      }
    }
    write += 1;
  }
  positions.truncate(write * FLOATS_PER_POINT);
  if let Some(colors) = colors {
    colors.truncate(write * FLOATS_PER_POINT);
  }
  (count - write) as u64
}

/// Encode one frame in wire format. Used by tests, benches and replay tools.
///
/// Colors are given normalized (0..1) and written with the metadata's
/// declared encoding.
pub fn encode_frame(meta: &ChunkMeta, positions: &[f32], colors: Option<&[f32]>) -> Vec<u8> {
  let meta_json = serde_json::to_vec(meta).unwrap_or_default();
  let mut out = Vec::with_capacity(LENGTH_PREFIX_BYTES + meta_json.len() + meta.payload_bytes());
  out.extend_from_slice(&(meta_json.len() as u32).to_be_bytes());
  out.extend_from_slice(&meta_json);
  for p in positions {
    out.extend_from_slice(&p.to_le_bytes());
  }
  if let (true, Some(colors)) = (meta.has_color, colors) {
    for &c in colors {
      match meta.color_encoding {
        ColorEncoding::U16 => {
          let q = (c.clamp(0.0, 1.0) * COLOR_U16_SCALE).round() as u16;
          out.extend_from_slice(&q.to_le_bytes());
        }
        ColorEncoding::F32 => out.extend_from_slice(&c.to_le_bytes()),
      }
    }
  }
  out
}

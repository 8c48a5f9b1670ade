//! Per-source growable point buffers.
//!
//! Each source id owns one pool: a position array, an optional color array
//! and a write offset. Chunks append at the write offset; a pool that runs
//! out of room grows to `max(capacity * 2, write + needed)` points, keeping
//! the written region byte-for-byte.
//!
//! ```text
//!   insert ──► [ written | free ........ ]   write_offset <= capacity
//!   flush  ──► snapshot owns [ written ]     pool restarts at offset 0
//!   drop(snapshot) ──► storage returns to the pool over a channel
//! ```
//!
//! Flushing transfers ownership of the storage instead of copying it. If the
//! pool needs to write again while its snapshot is still alive, it allocates
//! fresh storage of the same capacity and counts a fallback allocation.

mod snapshot;

use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};
use serde::Deserialize;

use crate::constants::{DEFAULT_INITIAL_POOL_POINTS, FLOATS_PER_POINT};
use crate::error::{StreamError, StreamResult};
use crate::types::Chunk;

pub use snapshot::PointSetSnapshot;
use snapshot::RecycledStorage;

/// Pool sizing.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
  /// Capacity of a newly created pool, in points.
  pub initial_capacity_points: usize,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      initial_capacity_points: DEFAULT_INITIAL_POOL_POINTS,
    }
  }
}

/// Counters kept by a [`BufferPoolManager`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
  pub chunks_inserted: u64,
  pub points_inserted: u64,
  /// Reallocations caused by a pool running out of room.
  pub growths: u64,
  /// Fresh buffers allocated because the previous one was still lent out.
  pub fallback_allocations: u64,
  /// Chunks whose colors were discarded because their source is colorless.
  pub colors_dropped: u64,
  pub snapshots_flushed: u64,
  /// Buffers returned by dropped snapshots and reused.
  pub storage_recycled: u64,
}

struct SourcePool {
  /// `positions.len()` is the write offset in floats.
  positions: Vec<f32>,
  colors: Option<Vec<f32>>,
  capacity_points: usize,
  /// Storage is held by a live snapshot.
  lent: bool,
}

impl SourcePool {
  fn new(capacity_points: usize, has_color: bool) -> Self {
    let floats = capacity_points * FLOATS_PER_POINT;
    Self {
      positions: Vec::with_capacity(floats),
      colors: has_color.then(|| Vec::with_capacity(floats)),
      capacity_points,
      lent: false,
    }
  }

  fn written_points(&self) -> usize {
    self.positions.len() / FLOATS_PER_POINT
  }

  /// Make room for `needed` more points. Returns `true` if the pool grew.
  fn reserve(&mut self, needed: usize) -> bool {
    let write = self.written_points();
    if write + needed <= self.capacity_points {
      return false;
    }
    let new_capacity = (self.capacity_points * 2).max(write + needed);
    let extra = (new_capacity - write) * FLOATS_PER_POINT;
    self.positions.reserve_exact(extra);
    if let Some(colors) = self.colors.as_mut() {
      colors.reserve_exact(extra);
    }
    self.capacity_points = new_capacity;
    true
  }
}

/// Owns one [`SourcePool`] per source id.
pub struct BufferPoolManager {
  config: PoolConfig,
  pools: HashMap<String, SourcePool>,
  recycle_tx: Sender<RecycledStorage>,
  recycle_rx: Receiver<RecycledStorage>,
  stats: PoolStats,
}

impl Default for BufferPoolManager {
  fn default() -> Self {
    Self::new(PoolConfig::default())
  }
}

impl BufferPoolManager {
  pub fn new(config: PoolConfig) -> Self {
    let (recycle_tx, recycle_rx) = crossbeam_channel::unbounded();
    Self {
      config,
      pools: HashMap::new(),
      recycle_tx,
      recycle_rx,
      stats: PoolStats::default(),
    }
  }

  /// Append a chunk to its source pool, creating or growing the pool.
  ///
  /// A pool's color mode is fixed by the first chunk it sees. Colorless
  /// chunks in a colored pool are written as zeros; colors arriving for a
  /// colorless pool are dropped.
  #[cfg_attr(feature = "tracing-spans", tracing::instrument(skip_all, name = "pool::insert"))]
  pub fn insert(&mut self, chunk: Chunk) -> StreamResult<()> {
    if chunk.point_count() == 0 {
      return Err(StreamError::Schema(format!(
        "chunk for '{}' has no points",
        chunk.source_id()
      )));
    }
    self.reclaim();

    let (meta, positions, colors) = chunk.into_parts();
    let count = meta.point_count as usize;
    let initial = self.config.initial_capacity_points.max(count);

    let pool = self
      .pools
      .entry(meta.source_id.clone())
      .or_insert_with(|| SourcePool::new(initial, colors.is_some()));

    if pool.lent {
      let floats = pool.capacity_points * FLOATS_PER_POINT;
      pool.positions = Vec::with_capacity(floats);
      if pool.colors.is_some() {
        pool.colors = Some(Vec::with_capacity(floats));
      }
      pool.lent = false;
      self.stats.fallback_allocations += 1;
      tracing::debug!(source = %meta.source_id, "pool storage still lent out, allocated fresh buffer");
    }

    if pool.reserve(count) {
      self.stats.growths += 1;
      tracing::debug!(source = %meta.source_id, capacity = pool.capacity_points, "pool grew");
    }

    pool.positions.extend_from_slice(&positions);
    match (pool.colors.as_mut(), colors) {
      (Some(dst), Some(src)) => dst.extend_from_slice(&src),
      (Some(dst), None) => dst.resize(dst.len() + positions.len(), 0.0),
      (None, Some(_)) => {
        self.stats.colors_dropped += 1;
        tracing::warn!(source = %meta.source_id, "dropping colors for a colorless source");
      }
      (None, None) => {}
    }

    self.stats.chunks_inserted += 1;
    self.stats.points_inserted += count as u64;
    Ok(())
  }

  /// Move the written region of a pool into a snapshot.
  ///
  /// The pool restarts at offset 0 with its capacity unchanged. Returns
  /// `None` for unknown or empty pools.
  pub fn flush(&mut self, source_id: &str) -> Option<PointSetSnapshot> {
    self.reclaim();
    let pool = self.pools.get_mut(source_id)?;
    if pool.positions.is_empty() {
      return None;
    }
    let positions = std::mem::take(&mut pool.positions);
    let colors = pool.colors.as_mut().map(std::mem::take);
    pool.lent = true;
    self.stats.snapshots_flushed += 1;
    Some(PointSetSnapshot::new(
      source_id.to_string(),
      positions,
      colors,
      self.recycle_tx.clone(),
    ))
  }

  /// Flush every non-empty pool, ordered by source id.
  pub fn flush_all(&mut self) -> Vec<PointSetSnapshot> {
    self
      .sources()
      .iter()
      .filter_map(|source| self.flush(source))
      .collect()
  }

  /// Release a pool. Snapshots already flushed from it stay valid.
  pub fn clear(&mut self, source_id: &str) -> bool {
    self.pools.remove(source_id).is_some()
  }

  /// Release every pool.
  ///
  /// Snapshots still alive stay valid, but their storage is freed on drop
  /// instead of coming back to this manager.
  pub fn clear_all(&mut self) {
    self.pools.clear();
    let (recycle_tx, recycle_rx) = crossbeam_channel::unbounded();
    self.recycle_tx = recycle_tx;
    self.recycle_rx = recycle_rx;
  }

  /// Known source ids, sorted.
  pub fn sources(&self) -> Vec<String> {
    let mut sources: Vec<String> = self.pools.keys().cloned().collect();
    sources.sort();
    sources
  }

  /// Points written but not yet flushed.
  pub fn pending_points(&self, source_id: &str) -> usize {
    self.pools.get(source_id).map_or(0, SourcePool::written_points)
  }

  /// Current capacity in points, or `None` for an unknown source.
  pub fn capacity_points(&self, source_id: &str) -> Option<usize> {
    self.pools.get(source_id).map(|pool| pool.capacity_points)
  }

  /// Whether the pool for `source_id` stores colors.
  pub fn has_color(&self, source_id: &str) -> bool {
    self.pools.get(source_id).is_some_and(|pool| pool.colors.is_some())
  }

  pub fn stats(&self) -> PoolStats {
    self.stats
  }

  /// Take back storage from dropped snapshots.
  fn reclaim(&mut self) {
    while let Ok(storage) = self.recycle_rx.try_recv() {
      let Some(pool) = self.pools.get_mut(&storage.source_id) else {
        continue;
      };
      if !pool.lent {
        continue;
      }
      let RecycledStorage {
        mut positions, colors, ..
      } = storage;
      positions.clear();
      pool.positions = positions;
      if pool.colors.is_some() {
        pool.colors = Some(match colors {
          Some(mut colors) => {
            colors.clear();
            colors
          }
          None => Vec::with_capacity(pool.capacity_points * FLOATS_PER_POINT),
        });
      }
      pool.lent = false;
      self.stats.storage_recycled += 1;
    }
  }
}

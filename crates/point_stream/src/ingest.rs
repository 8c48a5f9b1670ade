//! Queue between the decoder and the buffer pools.
//!
//! Follows the stage pattern: Enqueue → Tick → Drain
//!
//! Decoded chunks wait here until the consumer ticks; each tick moves at most
//! `batch_size` chunks into their pools, in arrival order. The flow
//! controller counts what sits in this queue.

use std::collections::VecDeque;

use serde::Deserialize;

use crate::constants::DEFAULT_INGEST_BATCH;
use crate::pool::BufferPoolManager;
use crate::types::Chunk;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
  /// Chunks inserted per tick (0 = the whole queue).
  pub batch_size: usize,
}

impl Default for IngestConfig {
  fn default() -> Self {
    Self {
      batch_size: DEFAULT_INGEST_BATCH,
    }
  }
}

/// Pending chunk queue feeding a [`BufferPoolManager`].
pub struct IngestStage {
  /// Chunks waiting for a tick
  pending: VecDeque<Chunk>,
  batch_size: usize,
  /// Chunks the pools refused
  rejected: u64,
}

impl Default for IngestStage {
  fn default() -> Self {
    Self::new(IngestConfig::default())
  }
}

impl IngestStage {
  pub fn new(config: IngestConfig) -> Self {
    Self {
      pending: VecDeque::new(),
      batch_size: config.batch_size,
      rejected: 0,
    }
  }

  /// Queue a decoded chunk. Returns the queue length.
  pub fn enqueue(&mut self, chunk: Chunk) -> usize {
    self.pending.push_back(chunk);
    self.pending.len()
  }

  /// Insert up to one batch into the pools.
  /// Returns the number of chunks taken off the queue this tick.
  #[cfg_attr(feature = "tracing-spans", tracing::instrument(skip_all, name = "ingest::tick"))]
  pub fn tick(&mut self, pools: &mut BufferPoolManager) -> usize {
    let limit = if self.batch_size == 0 {
      self.pending.len()
    } else {
      self.batch_size.min(self.pending.len())
    };
    self.process(pools, limit)
  }

  /// Insert everything still queued.
  pub fn drain_all(&mut self, pools: &mut BufferPoolManager) -> usize {
    let count = self.pending.len();
    self.process(pools, count)
  }

  /// Drop queued chunks, optionally only those of one source.
  /// Returns the number dropped.
  pub fn discard(&mut self, source_id: Option<&str>) -> usize {
    let before = self.pending.len();
    match source_id {
      Some(source) => self.pending.retain(|chunk| chunk.source_id() != source),
      None => self.pending.clear(),
    }
    before - self.pending.len()
  }

  /// Number of queued chunks.
  pub fn pending_count(&self) -> usize {
    self.pending.len()
  }

  /// Chunks refused by the pools so far.
  pub fn rejected(&self) -> u64 {
    self.rejected
  }

  /// True when nothing is queued.
  pub fn is_idle(&self) -> bool {
    self.pending.is_empty()
  }

  fn process(&mut self, pools: &mut BufferPoolManager, limit: usize) -> usize {
    let mut processed = 0;
    while processed < limit {
      let Some(chunk) = self.pending.pop_front() else {
        break;
      };
      if let Err(err) = pools.insert(chunk) {
        self.rejected += 1;
        tracing::warn!(error = %err, "pool refused chunk");
      }
      processed += 1;
    }
    processed
  }
}

#[cfg(test)]
#[path = "ingest_test.rs"]
mod ingest_test;

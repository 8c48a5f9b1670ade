//! Diagnostics for a stream session.
//!
//! Counters are always collected: every rejected frame or chunk must stay
//! observable even though it never surfaces as a hard failure. Timing
//! windows are feature-gated (`metrics`) and runtime-toggled.
//!
//! ```ignore
//! use point_stream::metrics::COLLECT_METRICS;
//!
//! // Compile with --features metrics, then toggle at runtime:
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! let metrics = session.metrics();
//! println!("{} chunks rejected", metrics.total_rejected());
//! ```

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;

use crate::decoder::DecoderStats;
use crate::flow::FlowStats;
use crate::octree::IndexStats;
use crate::pool::PoolStats;

/// Runtime toggle for timing collection.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// Check if timing collection is enabled (both compile-time and runtime).
#[inline]
pub fn is_enabled() -> bool {
  #[cfg(feature = "metrics")]
  {
    COLLECT_METRICS.load(Ordering::Relaxed)
  }
  #[cfg(not(feature = "metrics"))]
  {
    false
  }
}

/// Fixed-size window over the most recent samples.
#[derive(Debug, Clone)]
pub struct RollingWindow {
  buffer: VecDeque<u64>,
  capacity: usize,
}

impl RollingWindow {
  pub fn new(capacity: usize) -> Self {
    Self {
      buffer: VecDeque::with_capacity(capacity),
      capacity,
    }
  }

  /// Push a sample, evicting the oldest when full.
  pub fn push(&mut self, value: u64) {
    if self.buffer.len() >= self.capacity {
      self.buffer.pop_front();
    }
    self.buffer.push_back(value);
  }

  pub fn len(&self) -> usize {
    self.buffer.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buffer.is_empty()
  }

  pub fn clear(&mut self) {
    self.buffer.clear();
  }

  pub fn last(&self) -> Option<u64> {
    self.buffer.back().copied()
  }

  pub fn average(&self) -> f64 {
    if self.buffer.is_empty() {
      0.0
    } else {
      self.buffer.iter().sum::<u64>() as f64 / self.buffer.len() as f64
    }
  }

  pub fn max(&self) -> Option<u64> {
    self.buffer.iter().copied().max()
  }
}

impl Default for RollingWindow {
  fn default() -> Self {
    Self::new(128)
  }
}

/// Recent per-call timings in microseconds.
#[derive(Debug, Clone, Default)]
pub struct TimingMetrics {
  /// `submit_bytes` decode time.
  pub decode_us: RollingWindow,
  /// Ingest tick (pool insertion) time.
  pub ingest_us: RollingWindow,
  /// Flush + index insertion time.
  pub index_us: RollingWindow,
}

impl TimingMetrics {
  pub fn record_decode(&mut self, us: u64) {
    if is_enabled() {
      self.decode_us.push(us);
    }
  }

  pub fn record_ingest(&mut self, us: u64) {
    if is_enabled() {
      self.ingest_us.push(us);
    }
  }

  pub fn record_index(&mut self, us: u64) {
    if is_enabled() {
      self.index_us.push(us);
    }
  }

  pub fn reset(&mut self) {
    self.decode_us.clear();
    self.ingest_us.clear();
    self.index_us.clear();
  }
}

/// Point-in-time copy of every counter in a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamMetrics {
  pub decoder: DecoderStats,
  pub pools: PoolStats,
  pub index: IndexStats,
  pub flow: FlowStats,
  /// Control messages delivered to subscribers.
  pub control_messages: u64,
  /// Text frames that were not JSON or had an unknown type.
  pub ignored_control_messages: u64,
  /// Chunks refused by the pool manager (schema problems after decoding).
  pub pool_rejections: u64,
  /// Tiles refused for missing origin metadata.
  pub missing_origin: u64,
}

impl StreamMetrics {
  /// Every frame or chunk that was dropped for any recoverable reason.
  pub fn total_rejected(&self) -> u64 {
    self.decoder.framing_errors
      + self.decoder.schema_errors
      + self.index.chunks_rejected
      + self.pool_rejections
      + self.missing_origin
  }
}

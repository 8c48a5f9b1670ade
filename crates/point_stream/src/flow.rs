//! Backpressure between the producer and the ingest queue.
//!
//! A counter of admitted-but-not-consumed chunks with one threshold. Crossing
//! the threshold upward emits a single [`FlowDirective::Pause`]; dropping back
//! below it emits a single [`FlowDirective::Resume`].

use std::fmt;

use serde::Deserialize;

use crate::constants::DEFAULT_HIGH_WATERMARK;
use crate::error::{StreamError, StreamResult};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
  /// Pending chunk count that pauses the producer.
  pub high_watermark: u32,
}

impl FlowConfig {
  pub fn validate(&self) -> StreamResult<()> {
    if self.high_watermark == 0 {
      return Err(StreamError::Config("flow.high_watermark must be >= 1".into()));
    }
    Ok(())
  }
}

impl Default for FlowConfig {
  fn default() -> Self {
    Self {
      high_watermark: DEFAULT_HIGH_WATERMARK,
    }
  }
}

/// Signal sent back to the producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowDirective {
  Pause,
  Resume,
}

impl FlowDirective {
  /// ASCII token written to the outbound channel.
  pub fn as_token(self) -> &'static str {
    match self {
      FlowDirective::Pause => "PAUSE",
      FlowDirective::Resume => "RESUME",
    }
  }
}

impl fmt::Display for FlowDirective {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_token())
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlowStats {
  pub pause_directives: u64,
  pub resume_directives: u64,
  /// Highest pending count observed.
  pub peak_pending: u64,
}

/// Pending-chunk counter with pause/resume hysteresis.
#[derive(Debug)]
pub struct FlowController {
  high_watermark: u32,
  pending: u32,
  paused: bool,
  stats: FlowStats,
}

impl Default for FlowController {
  fn default() -> Self {
    Self::new(FlowConfig::default())
  }
}

impl FlowController {
  pub fn new(config: FlowConfig) -> Self {
    Self {
      high_watermark: config.high_watermark.max(1),
      pending: 0,
      paused: false,
      stats: FlowStats::default(),
    }
  }

  /// A chunk entered the queue. Returns `Pause` the moment the watermark is
  /// reached.
  pub fn on_chunk_admitted(&mut self) -> Option<FlowDirective> {
    self.pending += 1;
    self.stats.peak_pending = self.stats.peak_pending.max(self.pending as u64);
    if self.should_pause() {
      self.paused = true;
      self.stats.pause_directives += 1;
      tracing::debug!(pending = self.pending, "pausing producer");
      return Some(FlowDirective::Pause);
    }
    None
  }

  /// A chunk left the queue. Returns `Resume` the moment pending drops below
  /// the watermark while paused.
  pub fn on_chunk_consumed(&mut self) -> Option<FlowDirective> {
    if self.pending == 0 {
      tracing::warn!("chunk consumed with nothing pending");
      return None;
    }
    self.pending -= 1;
    if self.should_resume() {
      self.paused = false;
      self.stats.resume_directives += 1;
      tracing::debug!(pending = self.pending, "resuming producer");
      return Some(FlowDirective::Resume);
    }
    None
  }

  #[inline]
  pub fn should_pause(&self) -> bool {
    !self.paused && self.pending >= self.high_watermark
  }

  #[inline]
  pub fn should_resume(&self) -> bool {
    self.paused && self.pending < self.high_watermark
  }

  pub fn pending(&self) -> u32 {
    self.pending
  }

  pub fn is_paused(&self) -> bool {
    self.paused
  }

  pub fn high_watermark(&self) -> u32 {
    self.high_watermark
  }

  pub fn stats(&self) -> FlowStats {
    self.stats
  }

  /// Forget pending chunks and the paused flag. Counters are kept.
  pub fn reset(&mut self) {
    self.pending = 0;
    self.paused = false;
  }
}

#[cfg(test)]
#[path = "flow_test.rs"]
mod flow_test;

//! Immutable views of flushed pool storage.

use crossbeam_channel::Sender;

use crate::constants::FLOATS_PER_POINT;

/// Storage handed back to its pool when a snapshot is dropped.
pub(crate) struct RecycledStorage {
  pub source_id: String,
  pub positions: Vec<f32>,
  pub colors: Option<Vec<f32>>,
}

/// The committed region of a source pool, moved out by a flush.
///
/// The snapshot owns the pool's storage while it lives, so nothing can
/// overwrite it. Dropping the snapshot returns the storage to the pool it came
/// from; this works from any thread.
pub struct PointSetSnapshot {
  source_id: String,
  positions: Vec<f32>,
  colors: Option<Vec<f32>>,
  recycle: Option<Sender<RecycledStorage>>,
}

impl PointSetSnapshot {
  pub(crate) fn new(
    source_id: String,
    positions: Vec<f32>,
    colors: Option<Vec<f32>>,
    recycle: Sender<RecycledStorage>,
  ) -> Self {
    Self {
      source_id,
      positions,
      colors,
      recycle: Some(recycle),
    }
  }

  pub fn source_id(&self) -> &str {
    &self.source_id
  }

  pub fn point_count(&self) -> usize {
    self.positions.len() / FLOATS_PER_POINT
  }

  pub fn positions(&self) -> &[f32] {
    &self.positions
  }

  pub fn colors(&self) -> Option<&[f32]> {
    self.colors.as_deref()
  }

  /// Keep the arrays instead of returning them to the pool.
  ///
  /// The pool will allocate fresh storage on its next insert.
  pub fn into_parts(mut self) -> (String, Vec<f32>, Option<Vec<f32>>) {
    self.recycle = None;
    (
      std::mem::take(&mut self.source_id),
      std::mem::take(&mut self.positions),
      self.colors.take(),
    )
  }
}

impl std::fmt::Debug for PointSetSnapshot {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PointSetSnapshot")
      .field("source_id", &self.source_id)
      .field("points", &self.point_count())
      .field("has_color", &self.colors.is_some())
      .finish()
  }
}

impl Drop for PointSetSnapshot {
  fn drop(&mut self) {
    let Some(recycle) = self.recycle.take() else {
      return;
    };
    // The manager may already be gone; the storage is then simply freed.
    let _ = recycle.send(RecycledStorage {
      source_id: std::mem::take(&mut self.source_id),
      positions: std::mem::take(&mut self.positions),
      colors: self.colors.take(),
    });
  }
}

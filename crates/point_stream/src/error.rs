//! Error kinds for the ingestion core.
//!
//! Only [`StreamError::TransportClosed`] ends a stream. Everything else is
//! recoverable: the offending frame or chunk is dropped, counted in
//! [`StreamMetrics`](crate::metrics::StreamMetrics), and processing continues.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type StreamResult<T> = Result<T, StreamError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StreamError {
  /// Malformed length prefix or metadata JSON. The frame is dropped.
  #[error("framing error: {0}")]
  Framing(String),

  /// Chunk rejected against a point budget. Counted, never partial.
  #[error("capacity exceeded: {requested} points requested, {available} available")]
  CapacityExceeded { requested: u64, available: u64 },

  /// Metadata parsed but a required field is absent or invalid.
  #[error("schema error: {0}")]
  Schema(String),

  /// Tile metadata has no origin, so its points cannot be placed.
  #[error("tile {0} has no origin")]
  MissingOrigin(String),

  /// Upstream transport closed; the session no longer accepts input.
  #[error("transport closed")]
  TransportClosed,

  /// Invalid session or tool configuration.
  #[error("invalid configuration: {0}")]
  Config(String),
}

impl StreamError {
  /// True for errors after which the stream keeps flowing.
  pub fn is_recoverable(&self) -> bool {
    !matches!(self, StreamError::TransportClosed | StreamError::Config(_))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transport_closed_is_terminal() {
    assert!(!StreamError::TransportClosed.is_recoverable());
    assert!(StreamError::Framing("bad".into()).is_recoverable());
    assert!(StreamError::CapacityExceeded {
      requested: 10,
      available: 2
    }
    .is_recoverable());
    assert!(StreamError::MissingOrigin("t0".into()).is_recoverable());
  }

  #[test]
  fn display_includes_details() {
    let err = StreamError::CapacityExceeded {
      requested: 10,
      available: 2,
    };
    assert_eq!(
      err.to_string(),
      "capacity exceeded: 10 points requested, 2 available"
    );
  }
}

//! Side-channel JSON control messages.
//!
//! These arrive as text frames next to the binary chunk stream and carry
//! session-level events. They are never part of the binary framing.

use serde::{Deserialize, Serialize};

/// A session-level event announced by the producer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
  /// Producer accepted the connection.
  Connected,
  /// Fraction or percentage of the dataset sent so far.
  Progress { progress: f64 },
  /// All chunks were sent.
  Complete,
  /// Producer-side failure. Older producers name the field `message`.
  Error {
    #[serde(default, alias = "message")]
    error: String,
  },
  /// Listing of sources the producer can stream.
  Files { files: Vec<String> },
}

/// Parse a text frame. Unknown types and non-JSON text yield `None`.
pub fn parse_control(text: &str) -> Option<ControlMessage> {
  match serde_json::from_str::<ControlMessage>(text) {
    Ok(message) => Some(message),
    Err(err) => {
      tracing::debug!(error = %err, "ignoring text frame");
      None
    }
  }
}

#[cfg(test)]
#[path = "control_test.rs"]
mod control_test;

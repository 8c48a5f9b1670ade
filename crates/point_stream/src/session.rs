//! Stream session: the consumer-facing API.
//!
//! A session owns one decoder, ingest queue, pool manager, octree and flow
//! controller, and moves data between them:
//!
//! ```text
//! submit_bytes ─► FrameDecoder ─► IngestStage ─tick─► BufferPoolManager
//!                                     │                     │ flush_all
//!                       FlowController ─► outbound()        ▼
//!                                                  PointSetSnapshot ─► Octree
//!                                                                        │
//!                                                        query_lod ◄─────┘
//! ```
//!
//! The lifecycle is `Active → Closed`. Closing drains the queue, indexes
//! every pool that still holds data, releases the pools and drops any
//! partial frame. After
//! that, submissions fail with [`StreamError::TransportClosed`].
//!
//! ```ignore
//! let mut session = StreamSession::new(SessionConfig::default())?;
//! let events = session.subscribe();
//! let directives = session.outbound();
//!
//! session.submit_bytes(&fragment)?;
//! session.tick();
//! for directive in directives.try_iter() {
//!     transport.send_text(directive.as_token());
//! }
//! let slices = session.query_lod(camera);
//! ```

use std::collections::HashSet;

use crossbeam_channel::{Receiver, Sender};
use glam::Vec3;
use serde::Deserialize;
use web_time::Instant;

use crate::decoder::{parse_control, ControlMessage, DecoderConfig, FrameDecoder};
use crate::error::{StreamError, StreamResult};
use crate::flow::{FlowConfig, FlowController, FlowDirective};
use crate::ingest::{IngestConfig, IngestStage};
use crate::metrics::{StreamMetrics, TimingMetrics};
use crate::octree::{LodSlice, Octree, OctreeConfig};
use crate::pool::{BufferPoolManager, PointSetSnapshot, PoolConfig};
use crate::tile::DatasetMetadata;
use crate::types::Chunk;

/// Every tunable of a session. Each section may be omitted.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
  pub decoder: DecoderConfig,
  pub pool: PoolConfig,
  pub octree: OctreeConfig,
  pub flow: FlowConfig,
  pub ingest: IngestConfig,
}

impl SessionConfig {
  /// Parse and validate a TOML document.
  pub fn from_toml_str(text: &str) -> StreamResult<Self> {
    let config: Self = toml::from_str(text).map_err(|err| StreamError::Config(err.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> StreamResult<()> {
    if self.decoder.max_meta_len == 0 {
      return Err(StreamError::Config("decoder.max_meta_len must be > 0".into()));
    }
    if self.decoder.max_points_per_chunk == 0 {
      return Err(StreamError::Config("decoder.max_points_per_chunk must be > 0".into()));
    }
    if self.pool.initial_capacity_points == 0 {
      return Err(StreamError::Config("pool.initial_capacity_points must be > 0".into()));
    }
    self.octree.validate()?;
    self.flow.validate()
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
  Active,
  Closed,
}

/// Why a session was closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
  /// The consumer ended the session.
  Client,
  /// The transport closed normally.
  TransportClosed,
  /// The transport failed.
  TransportError(String),
}

/// What [`StreamSession::clear`] releases.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClearTarget {
  /// Queued chunks and the pool of one source.
  Source(String),
  /// Every queued chunk, every pool and the index.
  All,
}

/// Notification delivered to [`StreamSession::subscribe`] receivers.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
  Control(ControlMessage),
  /// A pool was flushed and its points offered to the index.
  Flushed { source_id: String, points: usize },
  /// A recoverable error dropped a chunk or tile.
  Rejected(StreamError),
  Closed(CloseReason),
}

/// One ingestion session over a single transport.
pub struct StreamSession {
  config: SessionConfig,
  state: SessionState,
  decoder: FrameDecoder,
  ingest: IngestStage,
  pools: BufferPoolManager,
  index: Octree,
  flow: FlowController,
  timings: TimingMetrics,
  subscribers: Vec<Sender<SessionEvent>>,
  outbound_tx: Sender<FlowDirective>,
  outbound_rx: Receiver<FlowDirective>,
  /// First-seen order of listed and streamed source ids.
  known_sources: Vec<String>,
  known_set: HashSet<String>,
  control_messages: u64,
  ignored_control_messages: u64,
  missing_origin: u64,
}

impl StreamSession {
  pub fn new(config: SessionConfig) -> StreamResult<Self> {
    config.validate()?;
    let (outbound_tx, outbound_rx) = crossbeam_channel::unbounded();
    Ok(Self {
      state: SessionState::Active,
      decoder: FrameDecoder::new(config.decoder.clone()),
      ingest: IngestStage::new(config.ingest.clone()),
      pools: BufferPoolManager::new(config.pool.clone()),
      index: Octree::new(config.octree.clone()),
      flow: FlowController::new(config.flow.clone()),
      timings: TimingMetrics::default(),
      subscribers: Vec::new(),
      outbound_tx,
      outbound_rx,
      known_sources: Vec::new(),
      known_set: HashSet::new(),
      control_messages: 0,
      ignored_control_messages: 0,
      missing_origin: 0,
      config,
    })
  }

  /// Feed a binary transport fragment. Returns the number of chunks it
  /// completed; they wait in the ingest queue until [`StreamSession::tick`].
  pub fn submit_bytes(&mut self, fragment: &[u8]) -> StreamResult<usize> {
    self.ensure_active()?;
    let start = Instant::now();
    let chunks = self.decoder.push(fragment);
    let count = chunks.len();
    for chunk in chunks {
      self.admit(chunk);
    }
    self.timings.record_decode(start.elapsed().as_micros() as u64);
    Ok(count)
  }

  /// Feed a text transport frame. Returns the control message it carried,
  /// or `None` for text that is not a known control message.
  ///
  /// `complete` flushes every pool into the index; `files` extends
  /// [`StreamSession::known_sources`].
  pub fn submit_text(&mut self, text: &str) -> StreamResult<Option<ControlMessage>> {
    self.ensure_active()?;
    let Some(message) = parse_control(text) else {
      self.ignored_control_messages += 1;
      return Ok(None);
    };
    self.control_messages += 1;

    match &message {
      ControlMessage::Files { files } => {
        for file in files {
          self.note_source(file);
        }
      }
      ControlMessage::Error { error } => {
        tracing::error!(error = %error, "producer reported an error");
      }
      ControlMessage::Progress { progress } => {
        tracing::debug!(progress, "producer progress");
      }
      ControlMessage::Connected | ControlMessage::Complete => {}
    }
    self.broadcast(SessionEvent::Control(message.clone()));

    if message == ControlMessage::Complete {
      self.drain_queue();
      drop(self.flush_all());
    }
    Ok(Some(message))
  }

  /// Decode a dataset tile and queue it like a streamed chunk.
  pub fn submit_tile(&mut self, dataset: &DatasetMetadata, id: &str, bytes: &[u8]) -> StreamResult<()> {
    self.ensure_active()?;
    match dataset.decode_tile(id, bytes) {
      Ok(chunk) => {
        self.admit(chunk);
        Ok(())
      }
      Err(err) => {
        if matches!(err, StreamError::MissingOrigin(_)) {
          self.missing_origin += 1;
        }
        tracing::warn!(tile = id, error = %err, "tile rejected");
        self.broadcast(SessionEvent::Rejected(err.clone()));
        Err(err)
      }
    }
  }

  /// Move one batch of queued chunks into their pools.
  /// Returns the number of chunks taken off the queue.
  pub fn tick(&mut self) -> usize {
    if self.state == SessionState::Closed {
      return 0;
    }
    let start = Instant::now();
    let processed = self.ingest.tick(&mut self.pools);
    self.consumed(processed);
    self.timings.record_ingest(start.elapsed().as_micros() as u64);
    processed
  }

  /// Flush every pool holding data and insert the snapshots into the index.
  ///
  /// Chunks the index refuses for its point budget are reported as
  /// [`SessionEvent::Rejected`]; their snapshots are still returned.
  pub fn flush_all(&mut self) -> Vec<PointSetSnapshot> {
    let start = Instant::now();
    let snapshots = self.pools.flush_all();
    for snapshot in &snapshots {
      self.index_snapshot(snapshot);
    }
    self.timings.record_index(start.elapsed().as_micros() as u64);
    snapshots
  }

  /// Select points for rendering from the current index.
  pub fn query_lod(&self, camera: Vec3) -> Vec<LodSlice<'_>> {
    self.index.collect_lod(camera)
  }

  /// Release queued chunks and pool storage.
  ///
  /// Points already in the index stay there unless the whole session is
  /// cleared.
  pub fn clear(&mut self, target: ClearTarget) {
    match target {
      ClearTarget::Source(source_id) => {
        let dropped = self.ingest.discard(Some(&source_id));
        self.consumed(dropped);
        self.pools.clear(&source_id);
        tracing::debug!(source = %source_id, dropped, "cleared source");
      }
      ClearTarget::All => {
        let dropped = self.ingest.discard(None);
        self.consumed(dropped);
        self.pools.clear_all();
        self.index = Octree::new(self.config.octree.clone());
        tracing::debug!(dropped, "cleared session");
      }
    }
  }

  /// Receiver of every event from now on. Each subscriber gets its own copy.
  pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
    let (sender, receiver) = crossbeam_channel::unbounded();
    self.subscribers.push(sender);
    receiver
  }

  /// Pause/resume directives for the producer, in emission order.
  ///
  /// Receivers share one queue; hand this to a single transport writer.
  pub fn outbound(&self) -> Receiver<FlowDirective> {
    self.outbound_rx.clone()
  }

  /// End the session.
  ///
  /// Drains the ingest queue, flushes every pool with data into the index,
  /// releases the pools, discards any partially received frame and returns
  /// the final snapshots.
  /// Closing twice is a no-op.
  pub fn close(&mut self, reason: CloseReason) -> Vec<PointSetSnapshot> {
    if self.state == SessionState::Closed {
      return Vec::new();
    }
    let queued = self.ingest.drain_all(&mut self.pools);
    self.flow.reset();
    let snapshots = self.flush_all();
    self.pools.clear_all();
    let discarded = self.decoder.reset();
    self.state = SessionState::Closed;
    tracing::info!(?reason, queued, discarded, "session closed");

    self.broadcast(SessionEvent::Closed(reason));
    self.subscribers.clear();
    snapshots
  }

  /// Swap in a tree built elsewhere (see [`crate::octree::AsyncIndexBuilder`]).
  /// Index statistics restart with the new tree.
  pub fn replace_index(&mut self, index: Octree) -> Octree {
    std::mem::replace(&mut self.index, index)
  }

  pub fn index(&self) -> &Octree {
    &self.index
  }

  pub fn pools(&self) -> &BufferPoolManager {
    &self.pools
  }

  pub fn metrics(&self) -> StreamMetrics {
    StreamMetrics {
      decoder: self.decoder.stats(),
      pools: self.pools.stats(),
      index: self.index.stats(),
      flow: self.flow.stats(),
      control_messages: self.control_messages,
      ignored_control_messages: self.ignored_control_messages,
      pool_rejections: self.ingest.rejected(),
      missing_origin: self.missing_origin,
    }
  }

  pub fn timings(&self) -> &TimingMetrics {
    &self.timings
  }

  /// Source ids from `files` listings and decoded chunks, de-duplicated, in
  /// first-seen order.
  pub fn known_sources(&self) -> &[String] {
    &self.known_sources
  }

  pub fn state(&self) -> SessionState {
    self.state
  }

  /// Chunks decoded but not yet moved into pools.
  pub fn pending_chunks(&self) -> usize {
    self.ingest.pending_count()
  }

  pub fn is_paused(&self) -> bool {
    self.flow.is_paused()
  }

  pub fn config(&self) -> &SessionConfig {
    &self.config
  }

  fn ensure_active(&self) -> StreamResult<()> {
    match self.state {
      SessionState::Active => Ok(()),
      SessionState::Closed => Err(StreamError::TransportClosed),
    }
  }

  fn admit(&mut self, chunk: Chunk) {
    self.note_source(chunk.source_id());
    self.ingest.enqueue(chunk);
    if let Some(directive) = self.flow.on_chunk_admitted() {
      self.send_directive(directive);
    }
  }

  fn consumed(&mut self, count: usize) {
    for _ in 0..count {
      if let Some(directive) = self.flow.on_chunk_consumed() {
        self.send_directive(directive);
      }
    }
  }

  fn drain_queue(&mut self) {
    let drained = self.ingest.drain_all(&mut self.pools);
    self.consumed(drained);
  }

  fn index_snapshot(&mut self, snapshot: &PointSetSnapshot) {
    let points = snapshot.point_count();
    let indexed = self.index.total_points() as u64;
    if self.index.insert_chunk(snapshot.positions(), snapshot.colors()) {
      self.broadcast(SessionEvent::Flushed {
        source_id: snapshot.source_id().to_string(),
        points,
      });
    } else {
      let available = self.config.octree.budget().remaining(indexed);
      self.broadcast(SessionEvent::Rejected(StreamError::CapacityExceeded {
        requested: points as u64,
        available,
      }));
    }
  }

  fn note_source(&mut self, source_id: &str) {
    if self.known_set.insert(source_id.to_string()) {
      self.known_sources.push(source_id.to_string());
    }
  }

  fn send_directive(&self, directive: FlowDirective) {
    // The session holds a receiver, so this cannot disconnect.
    let _ = self.outbound_tx.send(directive);
  }

  fn broadcast(&mut self, event: SessionEvent) {
    self
      .subscribers
      .retain(|subscriber| subscriber.send(event.clone()).is_ok());
  }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

//! point_stream - Streaming point cloud ingestion core
//!
//! This crate turns a fragmented byte stream of point chunks into per-source
//! buffers and a level-of-detail octree, without re-reading or re-allocating
//! the whole dataset on each update.
//!
//! # Features
//!
//! - **Frame Decoder**: Length-prefixed JSON + binary frames, tolerant of any
//!   fragmentation, with side-channel control messages
//! - **Buffer Pools**: One growable position/color buffer per source, flushed
//!   as zero-copy snapshots
//! - **Octree**: Arena tree with bulk build, incremental insertion under a
//!   point budget, and camera-driven LOD traversal
//! - **Flow Control**: PAUSE / RESUME backpressure on the pending queue
//! - **Tiles**: Preprocessed tile datasets decoded onto the same path
//!
//! # Example
//!
//! ```ignore
//! use point_stream::{SessionConfig, StreamSession};
//!
//! let mut session = StreamSession::new(SessionConfig::default())?;
//! let directives = session.outbound();
//!
//! // Feed transport fragments as they arrive
//! session.submit_bytes(&fragment)?;
//! session.submit_text(r#"{"type":"progress","progress":40}"#)?;
//!
//! // Consumer tick: move queued chunks into pools, tell the producer
//! session.tick();
//! for directive in directives.try_iter() {
//!     socket.send(directive.as_token());
//! }
//!
//! // Index what arrived and render
//! session.flush_all();
//! let slices = session.query_lod(camera_position);
//! println!("{} slices to draw", slices.len());
//! ```

pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use error::{StreamError, StreamResult};
pub use types::{Chunk, ChunkMeta, ColorEncoding};

// Wire protocol
pub mod decoder;
pub use decoder::{encode_frame, ControlMessage, DecoderConfig, FrameDecoder};

// Per-source point buffers
pub mod pool;
pub use pool::{BufferPoolManager, PointSetSnapshot, PoolConfig};

// Spatial index with LOD traversal
pub mod octree;
pub use octree::{merge_lod, LodPolicy, LodSlice, Octree, OctreeConfig};

// Backpressure
pub mod flow;
pub use flow::{FlowConfig, FlowController, FlowDirective};

// Queue between decoder and pools
pub mod ingest;
pub use ingest::{IngestConfig, IngestStage};

// Preprocessed tile datasets
pub mod tile;
pub use tile::{decode_tile, DatasetMetadata, TileMeta};

// Consumer-facing session
pub mod session;
pub use session::{ClearTarget, CloseReason, SessionConfig, SessionEvent, SessionState, StreamSession};

// Diagnostics
pub mod metrics;
pub use metrics::StreamMetrics;

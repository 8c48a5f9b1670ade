//! Off-thread index rebuilds.
//!
//! # Flow
//!
//! ```text
//! Consumer                          Async (rayon)
//! ┌──────────────────┐
//! │ Capture points   │
//! │ (positions, cfg) │
//! └───────┬──────────┘
//!         │ start()
//!         ▼
//!                                  ┌───────────────┐
//!                                  │ Octree::build │
//!                                  └───────┬───────┘
//!                                          │
//! ┌──────────────────┐                     │
//! │ poll()           │◄────────────────────┘
//! │ - swap the tree  │
//! └──────────────────┘
//! ```
//!
//! Readers keep using the previous tree until `poll` hands over the new one.
//!
//! ```ignore
//! let mut builder = AsyncIndexBuilder::new();
//! builder.start(BuildRequest::from_tree(&session_tree));
//!
//! // Later, once per tick:
//! if let Some(tree) = builder.poll() {
//!     session_tree = tree;
//! }
//! ```

use crossbeam_channel::{self as channel, Receiver, TryRecvError};

use super::config::OctreeConfig;
use super::tree::Octree;

/// Input captured for a background build.
pub struct BuildRequest {
	pub positions: Vec<f32>,
	pub colors: Option<Vec<f32>>,
	pub config: OctreeConfig,
}

impl BuildRequest {
	/// Capture a tree's current points and config.
	pub fn from_tree(tree: &Octree) -> Self {
		let mut positions = Vec::with_capacity(tree.total_points() * 3);
		let mut colors = Vec::with_capacity(tree.total_points() * 3);
		for (_, leaf) in tree.leaves() {
			positions.extend_from_slice(leaf.points());
			colors.extend_from_slice(leaf.colors());
		}
		Self {
			positions,
			colors: Some(colors),
			config: tree.config().clone(),
		}
	}
}

/// Non-blocking octree builder running on rayon's thread pool.
#[derive(Default)]
pub struct AsyncIndexBuilder {
	/// Receiver for the pending result.
	receiver: Option<Receiver<Octree>>,
}

impl AsyncIndexBuilder {
	pub fn new() -> Self {
		Self { receiver: None }
	}

	/// Check if a build is running.
	pub fn is_busy(&self) -> bool {
		self.receiver.is_some()
	}

	/// Start a build.
	///
	/// Returns `true` if started, `false` if already busy.
	pub fn start(&mut self, request: BuildRequest) -> bool {
		if self.is_busy() {
			return false;
		}

		let (sender, receiver) = channel::bounded(1);
		self.receiver = Some(receiver);

		rayon::spawn(move || {
			let tree = Octree::build(&request.positions, request.colors.as_deref(), request.config);
			// Receiver dropped = cancelled
			let _ = sender.send(tree);
		});

		true
	}

	/// Poll for the finished tree (non-blocking).
	pub fn poll(&mut self) -> Option<Octree> {
		let receiver = self.receiver.as_ref()?;

		match receiver.try_recv() {
			Ok(tree) => {
				self.receiver = None;
				Some(tree)
			}
			Err(TryRecvError::Empty) => None,
			Err(TryRecvError::Disconnected) => {
				tracing::warn!("index build task ended without a result");
				self.receiver = None;
				None
			}
		}
	}

	/// Block until the running build finishes.
	pub fn wait(&mut self) -> Option<Octree> {
		let receiver = self.receiver.take()?;
		receiver.recv().ok()
	}

	/// Drop the pending build. Its result is discarded.
	pub fn cancel(&mut self) {
		self.receiver = None;
	}
}

//! Point budget for the index.
//!
//! Caps the points a tree may hold so GPU memory stays bounded. Admission is
//! all-or-nothing per chunk.

/// Upper bound on indexed points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointBudget {
	/// Maximum points held by the tree (0 = unlimited).
	pub max_points: u64,
}

impl PointBudget {
	/// Default budget of five million points.
	pub const DEFAULT: Self = Self {
		max_points: crate::constants::DEFAULT_MAX_POINTS_GPU,
	};

	/// Unlimited budget for testing or offline builds.
	pub const UNLIMITED: Self = Self { max_points: 0 };

	/// Check if `incoming` more points fit next to `indexed` ones.
	#[inline]
	pub fn can_admit(&self, indexed: u64, incoming: u64) -> bool {
		self.max_points == 0 || indexed.saturating_add(incoming) <= self.max_points
	}

	/// Points still available (`u64::MAX` when unlimited).
	#[inline]
	pub fn remaining(&self, indexed: u64) -> u64 {
		if self.max_points == 0 {
			u64::MAX
		} else {
			self.max_points.saturating_sub(indexed)
		}
	}
}

impl Default for PointBudget {
	fn default() -> Self {
		Self::DEFAULT
	}
}

/// Statistics kept by an [`super::Octree`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
	/// Chunks admitted by `insert_chunk`.
	pub chunks_accepted: u64,
	/// Chunks refused by the point budget.
	pub chunks_rejected: u64,
	/// Points across refused chunks.
	pub points_rejected: u64,
	/// Full rebuilds, including ones caused by out-of-bounds chunks.
	pub rebuilds: u64,
	/// Leaves split after an insertion overflowed them.
	pub leaf_splits: u64,
	/// Points with a NaN or infinite coordinate left out of the tree.
	pub non_finite_dropped: u64,
}

impl IndexStats {
	/// Chunks offered to the index.
	#[inline]
	pub fn chunks_offered(&self) -> u64 {
		self.chunks_accepted + self.chunks_rejected
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_budget() {
		let budget = PointBudget::default();
		assert_eq!(budget.max_points, 5_000_000);
		assert!(budget.can_admit(4_999_999, 1));
		assert!(!budget.can_admit(4_999_999, 2));
	}

	#[test]
	fn test_unlimited_budget_always_allows() {
		let budget = PointBudget::UNLIMITED;
		assert!(budget.can_admit(u64::MAX - 1, 10));
		assert_eq!(budget.remaining(1000), u64::MAX);
	}

	#[test]
	fn test_remaining() {
		let budget = PointBudget { max_points: 10 };
		assert_eq!(budget.remaining(3), 7);
		assert_eq!(budget.remaining(12), 0);
	}

	#[test]
	fn test_stats_totals() {
		let stats = IndexStats {
			chunks_accepted: 4,
			chunks_rejected: 2,
			..Default::default()
		};
		assert_eq!(stats.chunks_offered(), 6);
	}
}

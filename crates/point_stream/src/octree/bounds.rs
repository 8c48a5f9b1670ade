//! Axis-aligned bounding box over point positions.

use glam::Vec3;

use crate::constants::{FLOATS_PER_POINT, UNBOUNDED_EXTENT};

/// Axis-aligned bounding box, inclusive on both corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
	/// Minimum corner (inclusive).
	pub min: Vec3,
	/// Maximum corner (inclusive).
	pub max: Vec3,
}

impl Aabb {
	/// Box covering `±UNBOUNDED_EXTENT` on every axis. Root of a fresh tree.
	pub const UNBOUNDED: Self = Self {
		min: Vec3::splat(-UNBOUNDED_EXTENT),
		max: Vec3::splat(UNBOUNDED_EXTENT),
	};

	/// Create a new AABB from min and max corners.
	///
	/// # Panics
	/// Debug-asserts that min <= max on all axes.
	pub fn new(min: Vec3, max: Vec3) -> Self {
		debug_assert!(
			min.x <= max.x && min.y <= max.y && min.z <= max.z,
			"AABB min must be <= max on all axes"
		);
		Self { min, max }
	}

	/// Tight box around interleaved xyz positions, ignoring points with a
	/// non-finite coordinate. `None` when no finite point is left.
	pub fn from_points(positions: &[f32]) -> Option<Self> {
		let mut points = positions
			.chunks_exact(FLOATS_PER_POINT)
			.map(Vec3::from_slice)
			.filter(|p| p.is_finite());
		let first = points.next()?;
		let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
		Some(Self { min, max })
	}

	/// Grow every side by `fraction` of the largest extent (1.0 for a point box).
	pub fn padded(&self, fraction: f32) -> Aabb {
		let extent = self.size().max_element();
		let margin = if extent > 0.0 { extent * fraction } else { 1.0 };
		Self {
			min: self.min - Vec3::splat(margin),
			max: self.max + Vec3::splat(margin),
		}
	}

	/// Smallest box containing both.
	#[inline]
	pub fn union(&self, other: &Aabb) -> Aabb {
		Self {
			min: self.min.min(other.min),
			max: self.max.max(other.max),
		}
	}

	/// Check if this AABB contains a point.
	#[inline]
	pub fn contains_point(&self, point: Vec3) -> bool {
		point.x >= self.min.x
			&& point.x <= self.max.x
			&& point.y >= self.min.y
			&& point.y <= self.max.y
			&& point.z >= self.min.z
			&& point.z <= self.max.z
	}

	/// Whether every point of `positions` lies inside.
	pub fn contains_all(&self, positions: &[f32]) -> bool {
		positions
			.chunks_exact(FLOATS_PER_POINT)
			.all(|p| self.contains_point(Vec3::from_slice(p)))
	}

	/// Get the size of the AABB (max - min).
	#[inline]
	pub fn size(&self) -> Vec3 {
		self.max - self.min
	}

	/// Get the center of the AABB.
	#[inline]
	pub fn center(&self) -> Vec3 {
		(self.min + self.max) * 0.5
	}

	/// Octant of `point` relative to the center.
	///
	/// Bit 0 = +X, bit 1 = +Y, bit 2 = +Z. A coordinate equal to the center
	/// goes to the lower half.
	#[inline]
	pub fn octant_of(&self, point: Vec3) -> u8 {
		let c = self.center();
		(point.x > c.x) as u8 | ((point.y > c.y) as u8) << 1 | ((point.z > c.z) as u8) << 2
	}

	/// Sub-box for an octant, using the same bit layout as [`Aabb::octant_of`].
	pub fn octant_box(&self, octant: u8) -> Aabb {
		let c = self.center();
		let pick = |bit: u8, lo: f32, mid: f32, hi: f32| {
			if octant & bit != 0 {
				(mid, hi)
			} else {
				(lo, mid)
			}
		};
		let (min_x, max_x) = pick(1, self.min.x, c.x, self.max.x);
		let (min_y, max_y) = pick(2, self.min.y, c.y, self.max.y);
		let (min_z, max_z) = pick(4, self.min.z, c.z, self.max.z);
		Self {
			min: Vec3::new(min_x, min_y, min_z),
			max: Vec3::new(max_x, max_y, max_z),
		}
	}

	/// Euclidean distance from `point` to the box (0 inside).
	#[inline]
	pub fn distance_to_point(&self, point: Vec3) -> f32 {
		point.clamp(self.min, self.max).distance(point)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_from_points() {
		let aabb = Aabb::from_points(&[1.0, -2.0, 3.0, -1.0, 5.0, 0.0]).unwrap();
		assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
		assert_eq!(aabb.max, Vec3::new(1.0, 5.0, 3.0));
		assert!(Aabb::from_points(&[]).is_none());
	}

	#[test]
	fn test_from_points_ignores_non_finite() {
		let aabb = Aabb::from_points(&[1.0, 1.0, 1.0, f32::INFINITY, 0.0, 0.0, 2.0, f32::NAN, 2.0, 3.0, 3.0, 3.0]).unwrap();
		assert_eq!(aabb.min, Vec3::ONE);
		assert_eq!(aabb.max, Vec3::splat(3.0));
		assert!(aabb.center().is_finite());
		assert!(Aabb::from_points(&[f32::NAN, 0.0, 0.0]).is_none());
	}

	#[test]
	fn test_padded_keeps_center() {
		let aabb = Aabb::new(Vec3::ZERO, Vec3::new(4.0, 2.0, 0.0));
		let padded = aabb.padded(0.5);
		assert_eq!(padded.min, Vec3::splat(-2.0));
		assert_eq!(padded.max, Vec3::new(6.0, 4.0, 2.0));
		assert_eq!(padded.center(), aabb.center());

		let point = Aabb::new(Vec3::ONE, Vec3::ONE).padded(0.5);
		assert_eq!(point.size(), Vec3::splat(2.0));
	}

	#[test]
	fn test_contains_point() {
		let aabb = Aabb::new(Vec3::ZERO, Vec3::splat(10.0));

		// Inside
		assert!(aabb.contains_point(Vec3::splat(5.0)));

		// On boundary
		assert!(aabb.contains_point(Vec3::ZERO));
		assert!(aabb.contains_point(Vec3::splat(10.0)));

		// Outside
		assert!(!aabb.contains_point(Vec3::splat(-1.0)));
		assert!(!aabb.contains_point(Vec3::splat(11.0)));
	}

	#[test]
	fn test_center_goes_to_lower_octant() {
		let aabb = Aabb::new(Vec3::ZERO, Vec3::splat(10.0));
		assert_eq!(aabb.octant_of(Vec3::splat(5.0)), 0);
		assert_eq!(aabb.octant_of(Vec3::new(5.1, 5.0, 5.0)), 1);
		assert_eq!(aabb.octant_of(Vec3::new(5.0, 5.1, 5.0)), 2);
		assert_eq!(aabb.octant_of(Vec3::new(5.0, 5.0, 5.1)), 4);
		assert_eq!(aabb.octant_of(Vec3::splat(9.0)), 7);
	}

	#[test]
	fn test_octant_box_contains_its_points() {
		let aabb = Aabb::new(Vec3::splat(-4.0), Vec3::splat(4.0));
		for point in [Vec3::ZERO, Vec3::new(1.0, -1.0, 3.0), Vec3::splat(-4.0), Vec3::splat(4.0)] {
			let octant = aabb.octant_of(point);
			assert!(aabb.octant_box(octant).contains_point(point));
		}
		let upper = aabb.octant_box(7);
		assert_eq!(upper.min, Vec3::ZERO);
		assert_eq!(upper.max, Vec3::splat(4.0));
	}

	#[test]
	fn test_distance_to_point() {
		let aabb = Aabb::new(Vec3::ZERO, Vec3::splat(10.0));
		assert_eq!(aabb.distance_to_point(Vec3::splat(5.0)), 0.0);
		assert_eq!(aabb.distance_to_point(Vec3::new(13.0, 5.0, 5.0)), 3.0);
	}

	#[test]
	fn test_union() {
		let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
		let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(0.5));
		let u = a.union(&b);
		assert_eq!(u.min, Vec3::splat(-1.0));
		assert_eq!(u.max, Vec3::ONE);
	}
}

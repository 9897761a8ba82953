//! Axis-aligned bounding boxes in projected coordinates.
//!
//! Unlike tile coordinates, a [`GeoBBox`] carries plain `f64` extents; the
//! vector tile clipper and the directory spatial filter both work on
//! envelopes in spherical-Mercator meters.

use std::fmt::{self, Debug};

/// A rectangular envelope `(x_min, y_min, x_max, y_max)`.
#[derive(Clone, Copy, PartialEq)]
pub struct GeoBBox {
	pub x_min: f64,
	pub y_min: f64,
	pub x_max: f64,
	pub y_max: f64,
}

impl GeoBBox {
	#[must_use]
	pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> GeoBBox {
		GeoBBox {
			x_min,
			y_min,
			x_max,
			y_max,
		}
	}

	/// The smallest envelope containing all `points`, or `None` for an empty
	/// slice.
	#[must_use]
	pub fn from_points(points: &[[f64; 2]]) -> Option<GeoBBox> {
		let first = points.first()?;
		let mut bbox = GeoBBox::new(first[0], first[1], first[0], first[1]);
		for p in &points[1..] {
			bbox.include_point(p[0], p[1]);
		}
		Some(bbox)
	}

	pub fn include_point(&mut self, x: f64, y: f64) {
		self.x_min = self.x_min.min(x);
		self.y_min = self.y_min.min(y);
		self.x_max = self.x_max.max(x);
		self.y_max = self.y_max.max(y);
	}

	pub fn extend(&mut self, other: &GeoBBox) {
		self.include_point(other.x_min, other.y_min);
		self.include_point(other.x_max, other.y_max);
	}

	/// `true` if `other` lies entirely within `self` (boundaries included).
	#[must_use]
	pub fn contains(&self, other: &GeoBBox) -> bool {
		other.x_min >= self.x_min && other.y_min >= self.y_min && other.x_max <= self.x_max && other.y_max <= self.y_max
	}

	/// `true` if the interiors of the two envelopes overlap.
	#[must_use]
	pub fn intersects(&self, other: &GeoBBox) -> bool {
		other.x_min < self.x_max && other.y_min < self.y_max && other.x_max > self.x_min && other.y_max > self.y_min
	}
}

impl Debug for GeoBBox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_fmt(format_args!(
			"GeoBBox({}, {}, {}, {})",
			self.x_min, self.y_min, self.x_max, self.y_max
		))
	}
}

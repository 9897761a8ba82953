//! The `Geometry` sum type.
//!
//! Coordinates are plain 2D `f64` pairs in whatever space the producer
//! works in: tile-local units while decoding, spherical-Mercator meters
//! once georeferenced.

use std::fmt::Debug;
use tileforge_core::GeoBBox;

pub type PointCoords = [f64; 2];
pub type LineCoords = Vec<PointCoords>;
pub type PolygonCoords = Vec<LineCoords>;

/// A 2D geometry, one of the six simple-feature kinds.
#[derive(Clone, PartialEq)]
pub enum Geometry {
	Point(PointCoords),
	LineString(LineCoords),
	Polygon(PolygonCoords),
	MultiPoint(LineCoords),
	MultiLineString(PolygonCoords),
	MultiPolygon(Vec<PolygonCoords>),
}

impl Geometry {
	/// The bounding box of all coordinates, or `None` for empty geometries.
	#[must_use]
	pub fn envelope(&self) -> Option<GeoBBox> {
		let mut bbox = GeoBBox::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
		let mut any = false;
		self.for_each_point(&mut |p| {
			bbox.include_point(p[0], p[1]);
			any = true;
		});
		any.then_some(bbox)
	}

	fn for_each_point(&self, f: &mut dyn FnMut(&PointCoords)) {
		match self {
			Geometry::Point(p) => f(p),
			Geometry::MultiPoint(line) | Geometry::LineString(line) => line.iter().for_each(f),
			Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
				lines.iter().flatten().for_each(f);
			}
			Geometry::MultiPolygon(polygons) => polygons.iter().flatten().flatten().for_each(f),
		}
	}

	/// Converts single kinds into their multi counterparts; multi kinds are
	/// returned unchanged.
	#[must_use]
	pub fn into_multi(self) -> Geometry {
		match self {
			Geometry::Point(g) => Geometry::MultiPoint(vec![g]),
			Geometry::LineString(g) => Geometry::MultiLineString(vec![g]),
			Geometry::Polygon(g) => Geometry::MultiPolygon(vec![g]),
			other => other,
		}
	}

	#[must_use]
	pub fn type_name(&self) -> &'static str {
		match self {
			Geometry::Point(_) => "Point",
			Geometry::LineString(_) => "LineString",
			Geometry::Polygon(_) => "Polygon",
			Geometry::MultiPoint(_) => "MultiPoint",
			Geometry::MultiLineString(_) => "MultiLineString",
			Geometry::MultiPolygon(_) => "MultiPolygon",
		}
	}
}

impl Debug for Geometry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner: &dyn Debug = match self {
			Geometry::Point(g) => g,
			Geometry::LineString(g) | Geometry::MultiPoint(g) => g,
			Geometry::Polygon(g) | Geometry::MultiLineString(g) => g,
			Geometry::MultiPolygon(g) => g,
		};
		f.debug_tuple(self.type_name()).field(inner).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn envelope_covers_all_parts() {
		let geometry = Geometry::MultiLineString(vec![vec![[0.0, 1.0], [2.0, 3.0]], vec![[-1.0, 5.0]]]);
		assert_eq!(geometry.envelope().unwrap(), GeoBBox::new(-1.0, 1.0, 2.0, 5.0));
	}

	#[test]
	fn empty_geometry_has_no_envelope() {
		assert!(Geometry::MultiPoint(vec![]).envelope().is_none());
	}

	#[test]
	fn into_multi_wraps_single_kinds() {
		let point = Geometry::Point([1.0, 2.0]);
		assert_eq!(point.into_multi(), Geometry::MultiPoint(vec![[1.0, 2.0]]));

		let multi = Geometry::MultiPoint(vec![[1.0, 2.0]]);
		assert_eq!(multi.clone().into_multi(), multi);
	}
}

//! Clipping decoded geometries to the tile envelope.
//!
//! Geometries wholly inside the envelope pass through untouched and
//! geometries wholly outside drop the feature; only boundary-crossing
//! geometries pay for a boolean operation. Intersection results are
//! filtered to the layer's element kind and re-wrapped into the declared
//! multi kind where needed.

use super::GeometryKind;
use crate::geo::{Geometry, LineCoords, PolygonCoords};
use geo::BooleanOps;
use geo_types::{Coord, LineString, MultiLineString, MultiPolygon, Polygon};
use tileforge_core::GeoBBox;

fn envelope_polygon(envelope: &GeoBBox) -> Polygon<f64> {
	Polygon::new(
		LineString::from(vec![
			(envelope.x_min, envelope.y_min),
			(envelope.x_min, envelope.y_max),
			(envelope.x_max, envelope.y_max),
			(envelope.x_max, envelope.y_min),
			(envelope.x_min, envelope.y_min),
		]),
		vec![],
	)
}

fn to_line_string(line: &LineCoords) -> LineString<f64> {
	LineString::from(line.iter().map(|p| Coord { x: p[0], y: p[1] }).collect::<Vec<_>>())
}

fn from_line_string(line: &LineString<f64>) -> LineCoords {
	line.0.iter().map(|c| [c.x, c.y]).collect()
}

fn to_multi_polygon(polygons: &[PolygonCoords]) -> MultiPolygon<f64> {
	MultiPolygon(
		polygons
			.iter()
			.filter(|rings| !rings.is_empty())
			.map(|rings| {
				Polygon::new(
					to_line_string(&rings[0]),
					rings[1..].iter().map(to_line_string).collect(),
				)
			})
			.collect(),
	)
}

fn from_multi_polygon(multi: &MultiPolygon<f64>) -> Vec<PolygonCoords> {
	multi
		.0
		.iter()
		.map(|polygon| {
			let mut rings: PolygonCoords = vec![from_line_string(polygon.exterior())];
			rings.extend(polygon.interiors().iter().map(from_line_string));
			rings
		})
		.collect()
}

fn point_in_envelope(point: &[f64; 2], envelope: &GeoBBox) -> bool {
	point[0] >= envelope.x_min && point[0] <= envelope.x_max && point[1] >= envelope.y_min && point[1] <= envelope.y_max
}

/// Clips a geometry to the tile envelope, or returns `None` when nothing
/// remains.
#[must_use]
pub fn clip_geometry(geometry: Geometry, envelope: &GeoBBox, target: GeometryKind) -> Option<Geometry> {
	let bbox = geometry.envelope()?;
	if envelope.contains(&bbox) {
		return Some(geometry);
	}
	if !envelope.intersects(&bbox) {
		return None;
	}

	match geometry {
		Geometry::Point(p) => point_in_envelope(&p, envelope).then_some(Geometry::Point(p)),
		Geometry::MultiPoint(points) => {
			let kept: LineCoords = points.into_iter().filter(|p| point_in_envelope(p, envelope)).collect();
			wrap_points(kept, target)
		}
		Geometry::LineString(line) => {
			let clipped = envelope_polygon(envelope).clip(&MultiLineString(vec![to_line_string(&line)]), false);
			wrap_lines(collect_lines(&clipped), target)
		}
		Geometry::MultiLineString(lines) => {
			let multi = MultiLineString(lines.iter().map(to_line_string).collect());
			let clipped = envelope_polygon(envelope).clip(&multi, false);
			wrap_lines(collect_lines(&clipped), target)
		}
		Geometry::Polygon(rings) => {
			let tile = MultiPolygon(vec![envelope_polygon(envelope)]);
			let clipped = tile.intersection(&to_multi_polygon(std::slice::from_ref(&rings)));
			wrap_polygons(from_multi_polygon(&clipped), target)
		}
		Geometry::MultiPolygon(polygons) => {
			let tile = MultiPolygon(vec![envelope_polygon(envelope)]);
			let clipped = tile.intersection(&to_multi_polygon(&polygons));
			wrap_polygons(from_multi_polygon(&clipped), target)
		}
	}
}

fn collect_lines(multi: &MultiLineString<f64>) -> PolygonCoords {
	multi
		.0
		.iter()
		.map(from_line_string)
		.filter(|line| line.len() >= 2)
		.collect()
}

fn wrap_points(mut points: LineCoords, target: GeometryKind) -> Option<Geometry> {
	match points.len() {
		0 => None,
		1 if target != GeometryKind::MultiPoint => Some(Geometry::Point(points.pop().unwrap())),
		_ => Some(Geometry::MultiPoint(points)),
	}
}

fn wrap_lines(mut lines: PolygonCoords, target: GeometryKind) -> Option<Geometry> {
	match lines.len() {
		0 => None,
		1 if target != GeometryKind::MultiLineString => Some(Geometry::LineString(lines.pop().unwrap())),
		_ => Some(Geometry::MultiLineString(lines)),
	}
}

fn wrap_polygons(mut polygons: Vec<PolygonCoords>, target: GeometryKind) -> Option<Geometry> {
	polygons.retain(|rings| rings.iter().any(|ring| ring.len() >= 4));
	match polygons.len() {
		0 => None,
		1 if target != GeometryKind::MultiPolygon => Some(Geometry::Polygon(polygons.pop().unwrap())),
		_ => Some(Geometry::MultiPolygon(polygons)),
	}
}

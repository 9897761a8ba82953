//! Decoding the MVT geometry command stream.
//!
//! A geometry is a sequence of varints: each command word packs a command
//! id (low 3 bits: MoveTo=1, LineTo=2, ClosePath=7) with a repeat count
//! (upper bits), followed by zig-zag-encoded coordinate deltas. Deltas
//! accumulate from `(0, 0)` across the whole feature.

use super::{GeomType, GeometryKind, TileGeoreference};
use crate::geo::{Geometry, LineCoords, PolygonCoords};
use crate::math::area_ring;
use anyhow::{Result, bail, ensure};
use byteorder::LE;
use log::warn;
use tileforge_core::io::ValueReader;

const CMD_MOVE_TO: u64 = 1;
const CMD_LINE_TO: u64 = 2;
const CMD_CLOSE_PATH: u64 = 7;

fn cmd_id(word: u64) -> u64 {
	word & 0x7
}

fn cmd_count(word: u64) -> u64 {
	word >> 3
}

/// Cursor state shared across a feature's command stream.
struct Cursor<'r, 'a> {
	reader: &'r mut dyn ValueReader<'a, LE>,
	x: i64,
	y: i64,
}

impl Cursor<'_, '_> {
	fn next_point(&mut self, georef: &TileGeoreference, extent: u32) -> Result<[f64; 2]> {
		self.x += self.reader.read_svarint()?;
		self.y += self.reader.read_svarint()?;
		Ok(georef.to_map(self.x, self.y, extent))
	}
}

/// Decodes one feature's geometry.
///
/// `target` is the layer-wide kind discovered by scanning; single results
/// are promoted into their multi counterpart when the layer kind demands
/// it.
pub fn decode_geometry(
	reader: &mut dyn ValueReader<'_, LE>,
	geom_type: GeomType,
	target: GeometryKind,
	georef: &TileGeoreference,
	extent: u32,
) -> Result<Geometry> {
	let mut cursor = Cursor { reader, x: 0, y: 0 };
	match geom_type {
		GeomType::Point => decode_points(&mut cursor, target, georef, extent),
		GeomType::LineString => decode_line_strings(&mut cursor, target, georef, extent),
		GeomType::Polygon => decode_polygons(&mut cursor, target, georef, extent),
		GeomType::Unknown => bail!("unknown geometry type"),
	}
}

fn decode_points(
	cursor: &mut Cursor,
	target: GeometryKind,
	georef: &TileGeoreference,
	extent: u32,
) -> Result<Geometry> {
	let word = cursor.reader.read_varint()?;
	ensure!(cmd_id(word) == CMD_MOVE_TO, "point geometry must start with MoveTo");
	let count = cmd_count(word);
	ensure!(count >= 1, "point geometry must carry at least one coordinate");

	if count == 1 {
		let point = cursor.next_point(georef, extent)?;
		if target == GeometryKind::MultiPoint {
			Ok(Geometry::MultiPoint(vec![point]))
		} else {
			Ok(Geometry::Point(point))
		}
	} else {
		let mut points = LineCoords::with_capacity(count as usize);
		for _ in 0..count {
			points.push(cursor.next_point(georef, extent)?);
		}
		Ok(Geometry::MultiPoint(points))
	}
}

fn decode_line_strings(
	cursor: &mut Cursor,
	target: GeometryKind,
	georef: &TileGeoreference,
	extent: u32,
) -> Result<Geometry> {
	let mut lines: PolygonCoords = Vec::new();

	while cursor.reader.has_remaining() {
		let word = cursor.reader.read_varint()?;
		ensure!(cmd_id(word) == CMD_MOVE_TO, "line group must start with MoveTo");
		let mut line: LineCoords = vec![cursor.next_point(georef, extent)?];

		let word = cursor.reader.read_varint()?;
		ensure!(cmd_id(word) == CMD_LINE_TO, "MoveTo in a linestring must be followed by LineTo");
		for _ in 0..cmd_count(word) {
			line.push(cursor.next_point(georef, extent)?);
		}
		lines.push(line);
	}

	ensure!(!lines.is_empty(), "linestring geometry carries no coordinates");
	if lines.len() == 1 && target != GeometryKind::MultiLineString {
		Ok(Geometry::LineString(lines.pop().unwrap()))
	} else {
		Ok(Geometry::MultiLineString(lines))
	}
}

fn decode_polygons(
	cursor: &mut Cursor,
	target: GeometryKind,
	georef: &TileGeoreference,
	extent: u32,
) -> Result<Geometry> {
	let mut polygons: Vec<PolygonCoords> = Vec::new();
	let mut current: PolygonCoords = Vec::new();
	let mut exterior_clockwise = false;

	while cursor.reader.has_remaining() {
		let word = cursor.reader.read_varint()?;
		ensure!(cmd_id(word) == CMD_MOVE_TO, "ring must start with MoveTo");
		let mut ring: LineCoords = vec![cursor.next_point(georef, extent)?];

		let word = cursor.reader.read_varint()?;
		ensure!(cmd_id(word) == CMD_LINE_TO, "MoveTo in a ring must be followed by LineTo");
		for _ in 0..cmd_count(word) {
			ring.push(cursor.next_point(georef, extent)?);
		}

		let word = cursor.reader.read_varint()?;
		ensure!(cmd_id(word) == CMD_CLOSE_PATH, "ring must end with ClosePath");
		ensure!(cmd_count(word) == 1, "ClosePath count must be 1");
		if ring.first() != ring.last() {
			ring.push(ring[0]);
		}

		let clockwise = area_ring(&ring) < 0.0;
		if current.is_empty() {
			exterior_clockwise = clockwise;
			current.push(ring);
		} else if clockwise == exterior_clockwise {
			// Same winding as the exterior: a new polygon starts.
			polygons.push(std::mem::take(&mut current));
			current.push(ring);
		} else {
			current.push(ring);
		}
	}

	ensure!(!current.is_empty(), "polygon geometry carries no rings");
	polygons.push(current);

	if polygons.len() == 1 && target != GeometryKind::MultiPolygon {
		Ok(Geometry::Polygon(polygons.pop().unwrap()))
	} else {
		Ok(Geometry::MultiPolygon(polygons))
	}
}

/// Scans a geometry stream without materialising coordinates, returning the
/// kind it would decode to (single or multi). Used by the layer scan pass.
pub fn scan_geometry_kind(reader: &mut dyn ValueReader<'_, LE>, geom_type: GeomType) -> Result<GeometryKind> {
	match geom_type {
		GeomType::Unknown => bail!("unknown geometry type"),
		GeomType::Point => {
			let word = reader.read_varint()?;
			if cmd_id(word) == CMD_MOVE_TO && cmd_count(word) > 1 {
				Ok(GeometryKind::MultiPoint)
			} else {
				Ok(GeometryKind::Point)
			}
		}
		GeomType::LineString | GeomType::Polygon => {
			let closed = geom_type == GeomType::Polygon;
			let mut groups = 0;
			while reader.has_remaining() {
				if groups == 1 {
					return Ok(if closed {
						GeometryKind::MultiPolygon
					} else {
						GeometryKind::MultiLineString
					});
				}
				// MoveTo word plus its single coordinate pair
				reader.read_varint()?;
				reader.read_svarint()?;
				reader.read_svarint()?;
				let word = reader.read_varint()?;
				for _ in 0..cmd_count(word) {
					reader.read_svarint()?;
					reader.read_svarint()?;
				}
				if closed {
					reader.read_varint()?;
				}
				groups += 1;
			}
			if groups == 0 {
				warn!("geometry stream carries no command groups");
			}
			Ok(if closed {
				GeometryKind::Polygon
			} else {
				GeometryKind::LineString
			})
		}
	}
}

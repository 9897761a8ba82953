//! The tile container: framing scan and layer collection.

use super::layer::{LayerScanOptions, TileLayer};
use super::metadata::TileMetadata;
use super::{GeometryKind, TileGeoreference};
use anyhow::{Context, Result, ensure};
use log::warn;
use tileforge_core::io::{ValueReader, ValueReaderSlice};
use tileforge_core::utils::{decompress_gzip, is_gzip_compressed};
use tileforge_core::{Blob, TileCoord};

/// Hard per-tile byte budget; oversized inputs are rejected before any
/// allocation.
pub const MAX_TILE_SIZE: usize = 10 * 1024 * 1024;

/// Options for opening a tile.
#[derive(Clone, Debug)]
pub struct TileOptions {
	/// Clip feature geometries to the tile envelope.
	pub clip: bool,
	/// Metadata document supplying per-layer schemas and geometry hints.
	pub metadata: Option<TileMetadata>,
}

impl Default for TileOptions {
	fn default() -> Self {
		TileOptions {
			clip: true,
			metadata: None,
		}
	}
}

/// A scanned vector tile: a list of named layers.
#[derive(Debug)]
pub struct VectorTile {
	layers: Vec<TileLayer>,
}

impl VectorTile {
	/// Scans a tile from raw or gzip-framed bytes.
	///
	/// With a tile `address` the layers are georeferenced to WebMercator;
	/// without one, coordinates stay in the flipped tile-local space.
	///
	/// # Errors
	/// Fails when the input exceeds [`MAX_TILE_SIZE`] or the top-level
	/// framing is malformed. Individual malformed layers are skipped with a
	/// warning.
	pub fn from_slice(bytes: &[u8], address: Option<TileCoord>, options: &TileOptions) -> Result<VectorTile> {
		ensure!(
			bytes.len() <= MAX_TILE_SIZE,
			"tile of {} bytes exceeds the {} byte budget",
			bytes.len(),
			MAX_TILE_SIZE
		);

		let decompressed;
		let bytes = if is_gzip_compressed(bytes) {
			decompressed = decompress_gzip(&Blob::from(bytes)).context("Failed to decompress gzip-framed tile")?;
			decompressed.as_slice()
		} else {
			bytes
		};

		let georef = match address {
			Some(coord) => TileGeoreference::new(&coord),
			None => TileGeoreference::unreferenced(),
		};

		let mut layers = Vec::new();
		let mut reader = ValueReaderSlice::new_le(bytes);
		while reader.has_remaining() {
			match reader.read_pbf_key().context("Failed to read tile-level PBF key")? {
				(3, 2) => {
					let data = reader.read_pbf_blob().context("Failed to read layer message")?;
					let scan_options = Self::layer_options(data.as_slice(), options);
					match TileLayer::read(data, georef, &scan_options) {
						Ok(layer) => layers.push(layer),
						Err(error) => warn!("skipping malformed layer: {error:#}"),
					}
				}
				(_, wire_type) => reader
					.skip_pbf_field(wire_type)
					.context("Failed to skip tile-level field")?,
			}
		}

		Ok(VectorTile { layers })
	}

	/// Builds the scan options for one layer, consulting the metadata
	/// document (when present) by the layer's name.
	fn layer_options(layer_bytes: &[u8], options: &TileOptions) -> LayerScanOptions {
		let mut scan = LayerScanOptions {
			clip: options.clip,
			..LayerScanOptions::default()
		};
		let Some(metadata) = &options.metadata else {
			return scan;
		};
		let Ok(Some(name)) = peek_layer_name(layer_bytes) else {
			return scan;
		};
		scan.fields = metadata.fields_for(&name);
		scan.geometry_hint = metadata.geometry_kind_for(&name).unwrap_or(GeometryKind::Unknown);
		scan
	}

	#[must_use]
	pub fn layers(&self) -> &[TileLayer] {
		&self.layers
	}

	pub fn layers_mut(&mut self) -> &mut [TileLayer] {
		&mut self.layers
	}

	#[must_use]
	pub fn layer_by_name(&self, name: &str) -> Option<&TileLayer> {
		self.layers.iter().find(|layer| layer.name == name)
	}

	pub fn layer_by_name_mut(&mut self, name: &str) -> Option<&mut TileLayer> {
		self.layers.iter_mut().find(|layer| layer.name == name)
	}
}

/// Reads just the name field (1) out of a layer message.
fn peek_layer_name(layer_bytes: &[u8]) -> Result<Option<String>> {
	let mut reader = ValueReaderSlice::new_le(layer_bytes);
	while reader.has_remaining() {
		match reader.read_pbf_key()? {
			(1, 2) => return Ok(Some(reader.read_pbf_string()?)),
			(_, wire_type) => reader.skip_pbf_field(wire_type)?,
		}
	}
	Ok(None)
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::geo::{GeoValue, Geometry};
	use crate::vector_tile::{EARTH_RADIUS, MAX_MERCATOR};
	use approx::assert_relative_eq;
	use std::f64::consts::PI;
	use tileforge_core::utils::compress_gzip;

	pub(crate) fn write_varint(out: &mut Vec<u8>, mut value: u64) {
		loop {
			let mut byte = (value & 0x7F) as u8;
			value >>= 7;
			if value != 0 {
				byte |= 0x80;
			}
			out.push(byte);
			if value == 0 {
				break;
			}
		}
	}

	fn write_key(out: &mut Vec<u8>, field: u64, wire_type: u64) {
		write_varint(out, field << 3 | wire_type);
	}

	fn write_bytes(out: &mut Vec<u8>, field: u64, payload: &[u8]) {
		write_key(out, field, 2);
		write_varint(out, payload.len() as u64);
		out.extend_from_slice(payload);
	}

	fn zigzag(value: i64) -> u64 {
		((value << 1) ^ (value >> 63)) as u64
	}

	fn value_bytes(value: &GeoValue) -> Vec<u8> {
		let mut out = Vec::new();
		match value {
			GeoValue::String(s) => write_bytes(&mut out, 1, s.as_bytes()),
			GeoValue::Float(f) => {
				write_key(&mut out, 2, 5);
				out.extend_from_slice(&f.to_le_bytes());
			}
			GeoValue::Double(f) => {
				write_key(&mut out, 3, 1);
				out.extend_from_slice(&f.to_le_bytes());
			}
			GeoValue::Int(i) => {
				write_key(&mut out, 4, 0);
				write_varint(&mut out, *i as u64);
			}
			GeoValue::UInt(u) => {
				write_key(&mut out, 5, 0);
				write_varint(&mut out, *u);
			}
			GeoValue::Bool(b) => {
				write_key(&mut out, 7, 0);
				write_varint(&mut out, u64::from(*b));
			}
		}
		out
	}

	/// Encodes the geometry command stream for a single point.
	pub(crate) fn point_geometry(x: i64, y: i64) -> Vec<u8> {
		let mut out = Vec::new();
		write_varint(&mut out, 1 << 3 | 1);
		write_varint(&mut out, zigzag(x));
		write_varint(&mut out, zigzag(y));
		out
	}

	/// Encodes one linestring from absolute points.
	pub(crate) fn line_geometry(points: &[(i64, i64)]) -> Vec<u8> {
		let mut out = Vec::new();
		let mut cursor = (0i64, 0i64);
		write_varint(&mut out, 1 << 3 | 1);
		push_delta(&mut out, &mut cursor, points[0]);
		write_varint(&mut out, ((points.len() as u64 - 1) << 3) | 2);
		for &p in &points[1..] {
			push_delta(&mut out, &mut cursor, p);
		}
		out
	}

	/// Encodes polygon rings (given unclosed) with MoveTo/LineTo/ClosePath.
	pub(crate) fn polygon_geometry(rings: &[Vec<(i64, i64)>]) -> Vec<u8> {
		let mut out = Vec::new();
		let mut cursor = (0i64, 0i64);
		for ring in rings {
			write_varint(&mut out, 1 << 3 | 1);
			push_delta(&mut out, &mut cursor, ring[0]);
			write_varint(&mut out, ((ring.len() as u64 - 1) << 3) | 2);
			for &p in &ring[1..] {
				push_delta(&mut out, &mut cursor, p);
			}
			write_varint(&mut out, 1 << 3 | 7);
		}
		out
	}

	fn push_delta(out: &mut Vec<u8>, cursor: &mut (i64, i64), point: (i64, i64)) {
		write_varint(out, zigzag(point.0 - cursor.0));
		write_varint(out, zigzag(point.1 - cursor.1));
		*cursor = point;
	}

	/// Builds synthetic layer and tile messages for tests.
	pub(crate) struct TileBuilder {
		name: String,
		extent: Option<u32>,
		version: u32,
		keys: Vec<String>,
		values: Vec<GeoValue>,
		features: Vec<Vec<u8>>,
	}

	impl TileBuilder {
		pub(crate) fn new(name: &str) -> TileBuilder {
			TileBuilder {
				name: name.to_string(),
				extent: None,
				version: 2,
				keys: Vec::new(),
				values: Vec::new(),
				features: Vec::new(),
			}
		}

		pub(crate) fn version(mut self, version: u32) -> TileBuilder {
			self.version = version;
			self
		}

		pub(crate) fn extent(mut self, extent: u32) -> TileBuilder {
			self.extent = Some(extent);
			self
		}

		pub(crate) fn key(mut self, key: &str) -> TileBuilder {
			self.keys.push(key.to_string());
			self
		}

		pub(crate) fn value(mut self, value: GeoValue) -> TileBuilder {
			self.values.push(value);
			self
		}

		pub(crate) fn feature(mut self, id: Option<u64>, tags: &[u32], geom_type: u64, geometry: &[u8]) -> TileBuilder {
			let mut out = Vec::new();
			if let Some(id) = id {
				write_key(&mut out, 1, 0);
				write_varint(&mut out, id);
			}
			if !tags.is_empty() {
				let mut packed = Vec::new();
				for &tag in tags {
					write_varint(&mut packed, u64::from(tag));
				}
				write_bytes(&mut out, 2, &packed);
			}
			write_key(&mut out, 3, 0);
			write_varint(&mut out, geom_type);
			write_bytes(&mut out, 4, geometry);
			self.features.push(out);
			self
		}

		fn layer_body(&self, with_name: bool) -> Vec<u8> {
			let mut out = Vec::new();
			if with_name {
				write_bytes(&mut out, 1, self.name.as_bytes());
			}
			for feature in &self.features {
				write_bytes(&mut out, 2, feature);
			}
			for key in &self.keys {
				write_bytes(&mut out, 3, key.as_bytes());
			}
			for value in &self.values {
				write_bytes(&mut out, 4, &value_bytes(value));
			}
			if let Some(extent) = self.extent {
				write_key(&mut out, 5, 0);
				write_varint(&mut out, u64::from(extent));
			}
			write_key(&mut out, 15, 0);
			write_varint(&mut out, u64::from(self.version));
			out
		}

		pub(crate) fn layer_bytes(&self) -> Vec<u8> {
			self.layer_body(true)
		}

		pub(crate) fn layer_bytes_without_name(&self) -> Vec<u8> {
			self.layer_body(false)
		}

		pub(crate) fn tile_bytes(&self) -> Vec<u8> {
			let mut out = Vec::new();
			write_bytes(&mut out, 3, &self.layer_body(true));
			out
		}
	}

	fn no_clip() -> TileOptions {
		TileOptions {
			clip: false,
			metadata: None,
		}
	}

	#[test]
	fn georeferenced_point_lands_in_mercator() -> Result<()> {
		let bytes = TileBuilder::new("pts")
			.feature(None, &[], 1, &point_geometry(10, 20))
			.tile_bytes();
		let mut tile = VectorTile::from_slice(&bytes, Some(TileCoord::new(0, 0, 0)?), &no_clip())?;

		let layer = tile.layer_by_name_mut("pts").unwrap();
		let feature = layer.next_feature()?.unwrap();
		let tile_dim = 2.0 * PI * EARTH_RADIUS;
		match feature.geometry {
			Geometry::Point(p) => {
				assert_relative_eq!(p[0], -PI * EARTH_RADIUS + 10.0 * tile_dim / 4096.0);
				assert_relative_eq!(p[1], PI * EARTH_RADIUS - 20.0 * tile_dim / 4096.0);
				assert!(p[0].abs() <= MAX_MERCATOR);
			}
			other => panic!("expected Point, got {other:?}"),
		}
		Ok(())
	}

	#[test]
	fn gzip_framed_tile_decodes_identically() -> Result<()> {
		let bytes = TileBuilder::new("pts")
			.feature(Some(1), &[], 1, &point_geometry(3, 4))
			.tile_bytes();
		let gzipped = compress_gzip(&Blob::from(bytes.as_slice()))?;

		let mut raw = VectorTile::from_slice(&bytes, None, &no_clip())?;
		let mut framed = VectorTile::from_slice(gzipped.as_slice(), None, &no_clip())?;

		let a = raw.layers_mut()[0].next_feature()?.unwrap();
		let b = framed.layers_mut()[0].next_feature()?.unwrap();
		assert_eq!(a, b);
		Ok(())
	}

	#[test]
	fn oversized_tile_is_rejected() {
		let bytes = vec![0u8; MAX_TILE_SIZE + 1];
		assert!(VectorTile::from_slice(&bytes, None, &no_clip()).is_err());
	}

	#[test]
	fn malformed_layer_is_skipped() -> Result<()> {
		let good = TileBuilder::new("good").feature(None, &[], 1, &point_geometry(1, 1));
		let bad = TileBuilder::new("bad").version(9).feature(None, &[], 1, &point_geometry(1, 1));

		let mut bytes = Vec::new();
		bytes.extend_from_slice(&bad.tile_bytes());
		bytes.extend_from_slice(&good.tile_bytes());

		let tile = VectorTile::from_slice(&bytes, None, &no_clip())?;
		assert_eq!(tile.layers().len(), 1);
		assert!(tile.layer_by_name("good").is_some());
		Ok(())
	}

	#[test]
	fn line_string_points_survive_round_trip() -> Result<()> {
		let points = [(0i64, 0i64), (10, 0), (10, 10), (30, 40)];
		let bytes = TileBuilder::new("lines")
			.feature(None, &[], 2, &line_geometry(&points))
			.tile_bytes();
		let mut tile = VectorTile::from_slice(&bytes, None, &no_clip())?;
		let feature = tile.layers_mut()[0].next_feature()?.unwrap();
		match feature.geometry {
			Geometry::LineString(line) => {
				assert_eq!(line.len(), points.len());
				for (decoded, original) in line.iter().zip(points.iter()) {
					assert_eq!(decoded[0], original.0 as f64);
					assert_eq!(decoded[1], 4096.0 - original.1 as f64);
				}
			}
			other => panic!("expected LineString, got {other:?}"),
		}
		Ok(())
	}

	#[test]
	fn polygon_with_hole_and_multipolygon() -> Result<()> {
		// Opposite winding: one polygon with an interior ring. The layer
		// scan promotes multi-group polygons to MultiPolygon, so the result
		// arrives wrapped.
		let bytes = TileBuilder::new("polys")
			.feature(
				None,
				&[],
				3,
				&polygon_geometry(&[
					vec![(0, 0), (10, 0), (10, 10), (0, 10)],
					vec![(2, 2), (2, 8), (8, 8), (8, 2)],
				]),
			)
			.tile_bytes();
		let mut tile = VectorTile::from_slice(&bytes, None, &no_clip())?;
		let feature = tile.layers_mut()[0].next_feature()?.unwrap();
		match feature.geometry {
			Geometry::MultiPolygon(polygons) => {
				assert_eq!(polygons.len(), 1);
				assert_eq!(polygons[0].len(), 2);
			}
			other => panic!("expected MultiPolygon with a hole, got {other:?}"),
		}

		// Same winding: two polygons.
		let bytes = TileBuilder::new("polys")
			.feature(
				None,
				&[],
				3,
				&polygon_geometry(&[
					vec![(0, 0), (10, 0), (10, 10), (0, 10)],
					vec![(20, 0), (30, 0), (30, 10), (20, 10)],
				]),
			)
			.tile_bytes();
		let mut tile = VectorTile::from_slice(&bytes, None, &no_clip())?;
		let feature = tile.layers_mut()[0].next_feature()?.unwrap();
		match feature.geometry {
			Geometry::MultiPolygon(polygons) => assert_eq!(polygons.len(), 2),
			other => panic!("expected MultiPolygon, got {other:?}"),
		}
		Ok(())
	}

	#[test]
	fn scanning_twice_yields_identical_schema() -> Result<()> {
		let bytes = TileBuilder::new("pois")
			.key("name")
			.key("rank")
			.value(GeoValue::from("x"))
			.value(GeoValue::Int(1))
			.feature(None, &[0, 0, 1, 1], 1, &point_geometry(1, 1))
			.tile_bytes();
		let first = VectorTile::from_slice(&bytes, None, &no_clip())?;
		let second = VectorTile::from_slice(&bytes, None, &no_clip())?;
		assert_eq!(first.layers()[0].schema(), second.layers()[0].schema());
		Ok(())
	}
}

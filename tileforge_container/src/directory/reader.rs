//! Reading vector tiles from a directory structure.
//!
//! The directory must be the zoom-level directory of a
//! `<root>/<z>/<x>/<y>.<ext>` tree:
//! ```text
//! /tiles/metadata.json
//! /tiles/3/2/1.pbf
//! /tiles/3/2/2.pbf
//! ```
//! When a sibling `metadata.json` is present, its `vector_layers` supply
//! the layer set and field schemas and its `tilestats` the geometry kinds;
//! otherwise the tiles themselves are scanned (up to a configurable cap)
//! and the union schema is widened across tiles.
//!
//! Feature ids are synthesized as
//! `(id_within_tile << 2z) | (y << z) | x`, which keeps them stable across
//! iteration and direct lookup.

use anyhow::{Context, Result, bail, ensure};
use itertools::Itertools;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use tileforge_core::{GeoBBox, TileCoord};
use tileforge_geometry::geo::{GeoFeature, GeoValue};
use tileforge_geometry::vector_tile::{
	FieldKind, FieldType, GeometryKind, LayerSchema, TileMetadata, TileOptions, VectorTile, tile_window_for_bbox,
};

/// Directory listings beyond this many entries fall back to an
/// integer-indexed scan.
pub const MAX_FILES_PER_DIR: usize = 10_000;

/// Options for opening a tile directory.
#[derive(Clone, Debug)]
pub struct DirectoryOptions {
	/// Tile file extension (without the dot).
	pub tile_extension: String,
	/// Explicit metadata document path; defaults to `metadata.json` next to
	/// the zoom directory.
	pub metadata_file: Option<PathBuf>,
	/// Clip feature geometries to their tile envelope.
	pub clip: bool,
	/// How many tiles to scan to establish layer schemas when no metadata
	/// document is available.
	pub max_tiles_for_schema: usize,
	/// Fold every attribute into one stringified `json` property instead of
	/// typed per-field properties.
	pub json_field: bool,
}

impl Default for DirectoryOptions {
	fn default() -> Self {
		DirectoryOptions {
			tile_extension: "pbf".to_string(),
			metadata_file: None,
			clip: true,
			max_tiles_for_schema: 1000,
			json_field: false,
		}
	}
}

/// A dataset over one zoom level of a tile directory tree.
pub struct DirectoryDataset {
	layers: Vec<DirectoryLayer>,
}

impl DirectoryDataset {
	/// Opens a zoom-level directory. The directory's name must be the
	/// integer zoom level.
	pub fn open(root: &Path, options: &DirectoryOptions) -> Result<DirectoryDataset> {
		ensure!(root.is_dir(), "path {root:?} is not a directory");
		let z: u8 = root
			.file_name()
			.and_then(|name| name.to_str())
			.and_then(|name| name.parse().ok())
			.with_context(|| format!("directory name of {root:?} is not a zoom level"))?;
		ensure!(z <= 30, "zoom level ({z}) must be <= 30");

		let metadata_path = options
			.metadata_file
			.clone()
			.or_else(|| root.parent().map(|parent| parent.join("metadata.json")));
		let metadata = match metadata_path {
			Some(path) if path.is_file() => {
				let bytes = fs::read(&path).with_context(|| format!("Failed to read {path:?}"))?;
				Some(TileMetadata::from_slice(&bytes).with_context(|| format!("Failed to parse {path:?}"))?)
			}
			_ => None,
		};

		let layers = match &metadata {
			Some(metadata) => metadata
				.layer_ids()
				.into_iter()
				.map(|name| {
					DirectoryLayer::new(
						name.to_string(),
						root,
						z,
						options,
						metadata.fields_for(name).unwrap_or_else(LayerSchema::new),
						metadata.geometry_kind_for(name).unwrap_or_default(),
						metadata.clone(),
						metadata.bounds(),
					)
				})
				.collect(),
			None => Self::scan_layers(root, z, options)?,
		};

		Ok(DirectoryDataset { layers })
	}

	/// Establishes the layer set by opening tiles until the scan cap is
	/// reached, unioning layer names and widening schemas.
	fn scan_layers(root: &Path, z: u8, options: &DirectoryOptions) -> Result<Vec<DirectoryLayer>> {
		struct ScannedLayer {
			name: String,
			schema: LayerSchema,
			geom_kind: GeometryKind,
		}

		let mut scanned: Vec<ScannedLayer> = Vec::new();
		let mut tiles_seen = 0usize;

		'scan: for x in list_numeric_entries(root)? {
			let sub_dir = root.join(x.to_string());
			for y in list_numeric_entries(&sub_dir)? {
				let path = sub_dir.join(format!("{y}.{}", options.tile_extension));
				let Ok(bytes) = fs::read(&path) else {
					continue;
				};
				let Ok(coord) = TileCoord::new(z, x, y) else {
					continue;
				};
				let tile_options = TileOptions {
					clip: options.clip,
					metadata: None,
				};
				let tile = match VectorTile::from_slice(&bytes, Some(coord), &tile_options) {
					Ok(tile) => tile,
					Err(error) => {
						warn!("skipping unreadable tile {path:?}: {error:#}");
						continue;
					}
				};

				for layer in tile.layers() {
					let kind = layer.geometry_kind().collection();
					if let Some(existing) = scanned.iter_mut().find(|entry| entry.name == layer.name) {
						if existing.geom_kind != kind {
							existing.geom_kind = GeometryKind::Unknown;
						}
						existing.schema.merge_schema(layer.schema());
					} else {
						scanned.push(ScannedLayer {
							name: layer.name.clone(),
							schema: layer.schema().clone(),
							geom_kind: kind,
						});
					}
				}

				tiles_seen += 1;
				if options.max_tiles_for_schema > 0 && tiles_seen == options.max_tiles_for_schema {
					break 'scan;
				}
			}
		}

		if scanned.is_empty() {
			bail!("no tiles found in {root:?}");
		}

		Ok(scanned
			.into_iter()
			.map(|entry| {
				DirectoryLayer::new(
					entry.name,
					root,
					z,
					options,
					entry.schema,
					entry.geom_kind,
					TileMetadata::default(),
					None,
				)
			})
			.collect())
	}

	#[must_use]
	pub fn layers(&self) -> &[DirectoryLayer] {
		&self.layers
	}

	#[must_use]
	pub fn layer(&self, name: &str) -> Option<&DirectoryLayer> {
		self.layers.iter().find(|layer| layer.name() == name)
	}

	pub fn layer_mut(&mut self, name: &str) -> Option<&mut DirectoryLayer> {
		self.layers.iter_mut().find(|layer| layer.name() == name)
	}
}

/// Lists the integer-named entries of a directory, ascending. Returns
/// `None` as "use indexed scan" when the listing exceeds
/// [`MAX_FILES_PER_DIR`].
fn list_numeric_dir(dir: &Path) -> Option<Vec<u32>> {
	let entries = fs::read_dir(dir).ok()?;
	let mut values = Vec::new();
	for entry in entries.flatten() {
		values.push(entry.file_name());
		if values.len() >= MAX_FILES_PER_DIR {
			debug!("listing of {dir:?} exceeds {MAX_FILES_PER_DIR} entries, using indexed scan");
			return None;
		}
	}
	Some(
		values
			.into_iter()
			.filter_map(|name| {
				let name = name.to_str()?;
				// strip a tile extension if present
				let stem = name.split('.').next()?;
				stem.parse::<u32>().ok()
			})
			.sorted_unstable()
			.dedup()
			.collect(),
	)
}

/// Like [`list_numeric_dir`] but for the schema scan, where a full listing
/// is required.
fn list_numeric_entries(dir: &Path) -> Result<Vec<u32>> {
	let mut values = Vec::new();
	let entries = match fs::read_dir(dir) {
		Ok(entries) => entries,
		Err(_) => return Ok(values),
	};
	for entry in entries.flatten() {
		let name = entry.file_name();
		let Some(name) = name.to_str() else {
			continue;
		};
		let Some(stem) = name.split('.').next() else {
			continue;
		};
		if let Ok(value) = stem.parse::<u32>() {
			values.push(value);
		}
	}
	values.sort_unstable();
	values.dedup();
	Ok(values)
}

/// One named layer across every tile of the zoom level.
pub struct DirectoryLayer {
	name: String,
	root: PathBuf,
	z: u8,
	tile_extension: String,
	clip: bool,
	json_field: bool,
	schema: LayerSchema,
	geom_kind: GeometryKind,
	metadata: TileMetadata,
	extent: Option<GeoBBox>,
	// spatial-filter tile window
	filter_min_x: u32,
	filter_min_y: u32,
	filter_max_x: u32,
	filter_max_y: u32,
	// iteration state
	x_entries: Option<Vec<u32>>,
	x_pos: usize,
	x_next: u32,
	current_x: Option<u32>,
	y_entries: Option<Vec<u32>>,
	y_pos: usize,
	y_next: u32,
	current_tile: Option<VectorTile>,
	fid_base: u64,
}

impl DirectoryLayer {
	#[allow(clippy::too_many_arguments)]
	fn new(
		name: String,
		root: &Path,
		z: u8,
		options: &DirectoryOptions,
		schema: LayerSchema,
		geom_kind: GeometryKind,
		metadata: TileMetadata,
		extent: Option<GeoBBox>,
	) -> DirectoryLayer {
		let grid_max = (1u32 << z) - 1;
		let schema = if options.json_field {
			let mut folded = LayerSchema::new();
			folded.add_or_merge("json", FieldType::new(FieldKind::String));
			folded
		} else {
			schema
		};
		let mut layer = DirectoryLayer {
			name,
			root: root.to_path_buf(),
			z,
			tile_extension: options.tile_extension.clone(),
			clip: options.clip,
			json_field: options.json_field,
			schema,
			geom_kind,
			metadata,
			extent,
			filter_min_x: 0,
			filter_min_y: 0,
			filter_max_x: grid_max,
			filter_max_y: grid_max,
			x_entries: None,
			x_pos: 0,
			x_next: 0,
			current_x: None,
			y_entries: None,
			y_pos: 0,
			y_next: 0,
			current_tile: None,
			fid_base: 0,
		};
		layer.reset();
		layer
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn zoom_level(&self) -> u8 {
		self.z
	}

	#[must_use]
	pub fn schema(&self) -> &LayerSchema {
		&self.schema
	}

	#[must_use]
	pub fn geometry_kind(&self) -> GeometryKind {
		self.geom_kind
	}

	/// The dataset extent advertised by the metadata document, when known.
	#[must_use]
	pub fn extent(&self) -> Option<GeoBBox> {
		self.extent
	}

	/// Restricts iteration to the tiles intersecting `envelope` (in
	/// Mercator meters), or removes the restriction. Resets the cursor.
	pub fn set_spatial_filter(&mut self, envelope: Option<&GeoBBox>) {
		let grid_max = (1u32 << self.z) - 1;
		match envelope {
			Some(envelope) => {
				let (min_x, min_y, max_x, max_y) = tile_window_for_bbox(envelope, self.z);
				self.filter_min_x = min_x;
				self.filter_min_y = min_y;
				self.filter_max_x = max_x;
				self.filter_max_y = max_y;
			}
			None => {
				self.filter_min_x = 0;
				self.filter_min_y = 0;
				self.filter_max_x = grid_max;
				self.filter_max_y = grid_max;
			}
		}
		self.reset();
	}

	/// Rewinds iteration to the first tile.
	pub fn reset(&mut self) {
		self.x_entries = list_numeric_dir(&self.root);
		self.x_pos = 0;
		self.x_next = 0;
		self.current_x = None;
		self.y_entries = None;
		self.y_pos = 0;
		self.y_next = 0;
		self.current_tile = None;
		self.fid_base = 0;
	}

	fn next_x(&mut self) -> Option<u32> {
		match &self.x_entries {
			Some(list) => {
				while self.x_pos < list.len() {
					let x = list[self.x_pos];
					self.x_pos += 1;
					if (self.filter_min_x..=self.filter_max_x).contains(&x) {
						return Some(x);
					}
				}
				None
			}
			None => {
				if self.x_next < self.filter_min_x {
					self.x_next = self.filter_min_x;
				}
				if self.x_next > self.filter_max_x {
					return None;
				}
				let x = self.x_next;
				self.x_next += 1;
				Some(x)
			}
		}
	}

	fn next_y(&mut self) -> Option<u32> {
		match &self.y_entries {
			Some(list) => {
				while self.y_pos < list.len() {
					let y = list[self.y_pos];
					self.y_pos += 1;
					if (self.filter_min_y..=self.filter_max_y).contains(&y) {
						return Some(y);
					}
				}
				None
			}
			None => {
				if self.y_next < self.filter_min_y {
					self.y_next = self.filter_min_y;
				}
				if self.y_next > self.filter_max_y {
					return None;
				}
				let y = self.y_next;
				self.y_next += 1;
				Some(y)
			}
		}
	}

	/// The next tile address inside the filter window, ascending X then
	/// ascending Y.
	fn advance(&mut self) -> Option<(u32, u32)> {
		loop {
			if self.current_x.is_none() {
				let x = self.next_x()?;
				self.current_x = Some(x);
				self.y_entries = list_numeric_dir(&self.root.join(x.to_string()));
				self.y_pos = 0;
				self.y_next = 0;
			}
			if let Some(y) = self.next_y()
				&& let Some(x) = self.current_x
			{
				return Some((x, y));
			}
			self.current_x = None;
		}
	}

	fn open_tile(&self, x: u32, y: u32) -> Option<VectorTile> {
		let path = self
			.root
			.join(x.to_string())
			.join(format!("{y}.{}", self.tile_extension));
		let bytes = fs::read(&path).ok()?;
		let coord = TileCoord::new(self.z, x, y).ok()?;
		// In json-field mode every attribute is wanted, so the metadata
		// schema must not filter fields.
		let options = TileOptions {
			clip: self.clip,
			metadata: (!self.json_field).then(|| self.metadata.clone()),
		};
		match VectorTile::from_slice(&bytes, Some(coord), &options) {
			Ok(tile) => Some(tile),
			Err(error) => {
				warn!("skipping unreadable tile {path:?}: {error:#}");
				None
			}
		}
	}

	/// Decodes and returns the next feature across tiles, or `None` when
	/// the zoom level is exhausted.
	pub fn next_feature(&mut self) -> Result<Option<GeoFeature>> {
		loop {
			if self.current_tile.is_none() {
				loop {
					let Some((x, y)) = self.advance() else {
						return Ok(None);
					};
					if let Some(tile) = self.open_tile(x, y) {
						if tile.layer_by_name(&self.name).is_some() {
							self.fid_base = (u64::from(y) << self.z) | u64::from(x);
							self.current_tile = Some(tile);
							break;
						}
					}
				}
			}

			if let Some(tile) = self.current_tile.as_mut() {
				if let Some(layer) = tile.layer_by_name_mut(&self.name)
					&& let Some(mut feature) = layer.next_feature()?
				{
					feature.id = (feature.id << (2 * u32::from(self.z))) | self.fid_base;
					if self.json_field {
						fold_properties_into_json(&mut feature);
					}
					return Ok(Some(feature));
				}
				self.current_tile = None;
			}
		}
	}

	/// An iterator over the remaining features.
	pub fn iter(&mut self) -> FeatureIter<'_> {
		FeatureIter { layer: self }
	}

	/// Fetches one feature by its synthesized id, without disturbing the
	/// iteration cursor.
	pub fn get_feature(&self, fid: u64) -> Result<Option<GeoFeature>> {
		let mask = (1u64 << self.z) - 1;
		let x = (fid & mask) as u32;
		let y = ((fid >> self.z) & mask) as u32;
		let local_fid = fid >> (2 * u32::from(self.z));

		let Some(mut tile) = self.open_tile(x, y) else {
			return Ok(None);
		};
		let Some(layer) = tile.layer_by_name_mut(&self.name) else {
			return Ok(None);
		};
		let Some(mut feature) = layer.feature(local_fid)? else {
			return Ok(None);
		};
		feature.id = fid;
		if self.json_field {
			fold_properties_into_json(&mut feature);
		}
		Ok(Some(feature))
	}

	/// Total feature count across the zoom level (honouring the spatial
	/// filter). Restarts iteration.
	pub fn feature_count(&mut self) -> Result<u64> {
		self.reset();
		let mut count = 0u64;
		loop {
			let Some((x, y)) = self.advance() else {
				break;
			};
			if let Some(tile) = self.open_tile(x, y)
				&& let Some(layer) = tile.layer_by_name(&self.name)
			{
				count += layer.feature_count();
			}
		}
		self.reset();
		Ok(count)
	}
}

/// Replaces the typed properties (except `mvt_id`) with one stringified
/// `json` property.
fn fold_properties_into_json(feature: &mut GeoFeature) {
	use serde_json::{Map, Number, Value};

	let mut object = Map::new();
	for (name, value) in std::mem::take(&mut feature.properties) {
		if name == "mvt_id" {
			feature.properties.insert(name, value);
			continue;
		}
		let json = match value {
			GeoValue::String(s) => Value::String(s),
			GeoValue::Bool(b) => Value::Bool(b),
			GeoValue::Int(i) => Value::Number(i.into()),
			GeoValue::UInt(u) => Value::Number(u.into()),
			GeoValue::Float(f) => Number::from_f64(f64::from(f)).map_or(Value::Null, Value::Number),
			GeoValue::Double(d) => Number::from_f64(d).map_or(Value::Null, Value::Number),
		};
		object.insert(name, json);
	}
	if !object.is_empty() {
		feature
			.properties
			.insert("json".to_string(), GeoValue::String(Value::Object(object).to_string()));
	}
}

/// Iterator adapter over [`DirectoryLayer::next_feature`].
pub struct FeatureIter<'a> {
	layer: &'a mut DirectoryLayer,
}

impl Iterator for FeatureIter<'_> {
	type Item = Result<GeoFeature>;

	fn next(&mut self) -> Option<Self::Item> {
		self.layer.next_feature().transpose()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;
	use tileforge_core::utils::compress_gzip;
	use tileforge_core::Blob;
	use tileforge_geometry::geo::{GeoValue, Geometry};
	use tileforge_geometry::vector_tile::FieldKind;

	fn write_varint(out: &mut Vec<u8>, mut value: u64) {
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

	/// A tile with one point layer; each point also carries a "name" string
	/// property and its index as mvt id.
	fn point_tile(layer_name: &str, points: &[(i64, i64)]) -> Vec<u8> {
		let mut layer = Vec::new();
		write_bytes(&mut layer, 1, layer_name.as_bytes());

		for (index, &(x, y)) in points.iter().enumerate() {
			let mut feature = Vec::new();
			write_key(&mut feature, 1, 0);
			write_varint(&mut feature, index as u64);
			let mut tags = Vec::new();
			write_varint(&mut tags, 0);
			write_varint(&mut tags, index as u64);
			write_bytes(&mut feature, 2, &tags);
			write_key(&mut feature, 3, 0);
			write_varint(&mut feature, 1); // point
			let mut geometry = Vec::new();
			write_varint(&mut geometry, 1 << 3 | 1); // MoveTo, count 1
			write_varint(&mut geometry, zigzag(x));
			write_varint(&mut geometry, zigzag(y));
			write_bytes(&mut feature, 4, &geometry);
			write_bytes(&mut layer, 2, &feature);
		}

		write_bytes(&mut layer, 3, b"name");
		for index in 0..points.len() {
			let mut value = Vec::new();
			write_bytes(&mut value, 1, format!("point-{index}").as_bytes());
			write_bytes(&mut layer, 4, &value);
		}
		write_key(&mut layer, 15, 0);
		write_varint(&mut layer, 2);

		let mut tile = Vec::new();
		write_bytes(&mut tile, 3, &layer);
		tile
	}

	fn write_tile(root: &Path, z: u8, x: u32, y: u32, bytes: &[u8]) {
		let dir = root.join(z.to_string()).join(x.to_string());
		fs::create_dir_all(&dir).unwrap();
		fs::write(dir.join(format!("{y}.pbf")), bytes).unwrap();
	}

	fn no_clip() -> DirectoryOptions {
		DirectoryOptions {
			clip: false,
			..DirectoryOptions::default()
		}
	}

	#[test]
	fn iterates_tiles_ascending_and_synthesizes_fids() -> Result<()> {
		let dir = TempDir::new()?;
		write_tile(dir.path(), 1, 0, 0, &point_tile("pts", &[(10, 10), (20, 20)]));
		write_tile(dir.path(), 1, 1, 0, &point_tile("pts", &[(30, 30)]));
		write_tile(dir.path(), 1, 1, 1, &point_tile("pts", &[(40, 40)]));

		let mut dataset = DirectoryDataset::open(&dir.path().join("1"), &no_clip())?;
		let layer = dataset.layer_mut("pts").unwrap();

		let fids: Vec<u64> = layer.iter().map(|feature| feature.unwrap().id).collect();
		// (local << 2z) | (y << z) | x with z = 1
		assert_eq!(fids, vec![0, 4, 1, 3]);

		assert_eq!(layer.feature_count()?, 4);
		Ok(())
	}

	#[test]
	fn get_feature_round_trips_every_fid() -> Result<()> {
		let dir = TempDir::new()?;
		write_tile(dir.path(), 2, 0, 0, &point_tile("pts", &[(1, 1), (2, 2)]));
		write_tile(dir.path(), 2, 3, 2, &point_tile("pts", &[(3, 3)]));

		let mut dataset = DirectoryDataset::open(&dir.path().join("2"), &no_clip())?;
		let layer = dataset.layer_mut("pts").unwrap();

		let features: Vec<GeoFeature> = layer.iter().collect::<Result<_>>()?;
		assert_eq!(features.len(), 3);
		for feature in features {
			let fetched = layer.get_feature(feature.id)?.unwrap();
			assert_eq!(fetched, feature);
		}
		assert!(layer.get_feature(u64::MAX)?.is_none());
		Ok(())
	}

	#[test]
	fn spatial_filter_narrows_tile_window() -> Result<()> {
		use tileforge_geometry::vector_tile::MAX_MERCATOR;

		let dir = TempDir::new()?;
		write_tile(dir.path(), 2, 0, 0, &point_tile("pts", &[(10, 10)]));
		write_tile(dir.path(), 2, 3, 3, &point_tile("pts", &[(20, 20)]));

		let mut dataset = DirectoryDataset::open(&dir.path().join("2"), &no_clip())?;
		let layer = dataset.layer_mut("pts").unwrap();

		// A small box in the north-west corner selects only tile (0, 0).
		let corner = GeoBBox::new(
			-MAX_MERCATOR + 1000.0,
			MAX_MERCATOR - 2000.0,
			-MAX_MERCATOR + 2000.0,
			MAX_MERCATOR - 1000.0,
		);
		layer.set_spatial_filter(Some(&corner));
		let features: Vec<GeoFeature> = layer.iter().collect::<Result<_>>()?;
		assert_eq!(features.len(), 1);
		assert_eq!(features[0].id & 0b11, 0);

		layer.set_spatial_filter(None);
		assert_eq!(layer.feature_count()?, 2);
		Ok(())
	}

	#[test]
	fn scan_mode_unions_layer_schemas() -> Result<()> {
		let dir = TempDir::new()?;
		write_tile(dir.path(), 1, 0, 0, &point_tile("pts", &[(1, 1)]));
		write_tile(dir.path(), 1, 1, 0, &point_tile("roads", &[(2, 2)]));

		let dataset = DirectoryDataset::open(&dir.path().join("1"), &no_clip())?;
		let mut names: Vec<&str> = dataset.layers().iter().map(|layer| layer.name()).collect();
		names.sort_unstable();
		assert_eq!(names, vec!["pts", "roads"]);

		let layer = dataset.layer("pts").unwrap();
		assert_eq!(layer.geometry_kind(), GeometryKind::MultiPoint);
		assert!(layer.schema().field_index("name").is_some());
		Ok(())
	}

	#[test]
	fn metadata_document_overrides_scanning() -> Result<()> {
		let dir = TempDir::new()?;
		write_tile(dir.path(), 1, 0, 0, &point_tile("pts", &[(1, 1)]));
		fs::write(
			dir.path().join("metadata.json"),
			r#"{
				"bounds": "-10,-5,10,5",
				"json": "{\"vector_layers\":[{\"id\":\"pts\",\"fields\":{\"name\":\"String\",\"rank\":\"Integer\"}}],\"tilestats\":{\"layers\":[{\"layer\":\"pts\",\"geometry\":\"Point\"}]}}"
			}"#,
		)?;

		let mut dataset = DirectoryDataset::open(&dir.path().join("1"), &no_clip())?;
		let layer = dataset.layer_mut("pts").unwrap();

		assert_eq!(layer.geometry_kind(), GeometryKind::MultiPoint);
		let schema = layer.schema();
		let rank = schema.fields()[schema.field_index("rank").unwrap()].1;
		assert_eq!(rank.kind, FieldKind::Int32);
		assert!(layer.extent().is_some());

		let feature = layer.next_feature()?.unwrap();
		assert_eq!(feature.properties.get("name"), Some(&GeoValue::from("point-0")));
		Ok(())
	}

	#[test]
	fn json_field_mode_folds_properties() -> Result<()> {
		let dir = TempDir::new()?;
		write_tile(dir.path(), 0, 0, 0, &point_tile("pts", &[(10, 20)]));

		let options = DirectoryOptions {
			clip: false,
			json_field: true,
			..DirectoryOptions::default()
		};
		let mut dataset = DirectoryDataset::open(&dir.path().join("0"), &options)?;
		let layer = dataset.layer_mut("pts").unwrap();

		let names: Vec<&str> = layer.schema().fields().iter().map(|(n, _)| n.as_str()).collect();
		assert_eq!(names, vec!["mvt_id", "json"]);

		let feature = layer.next_feature()?.unwrap();
		assert_eq!(feature.properties.get("mvt_id"), Some(&GeoValue::UInt(0)));
		assert_eq!(
			feature.properties.get("json"),
			Some(&GeoValue::from(r#"{"name":"point-0"}"#))
		);
		Ok(())
	}

	#[test]
	fn gzip_framed_tiles_are_unwrapped() -> Result<()> {
		let dir = TempDir::new()?;
		let bytes = point_tile("pts", &[(10, 20)]);
		let gzipped = compress_gzip(&Blob::from(bytes.as_slice()))?;
		write_tile(dir.path(), 0, 0, 0, gzipped.as_slice());

		let mut dataset = DirectoryDataset::open(&dir.path().join("0"), &no_clip())?;
		let layer = dataset.layer_mut("pts").unwrap();
		let feature = layer.next_feature()?.unwrap();
		assert!(matches!(feature.geometry, Geometry::Point(_)));
		Ok(())
	}

	#[test]
	fn non_integer_directory_name_is_rejected() -> Result<()> {
		let dir = TempDir::new()?;
		let bad = dir.path().join("tiles");
		fs::create_dir_all(&bad)?;
		assert!(DirectoryDataset::open(&bad, &no_clip()).is_err());
		Ok(())
	}

	#[test]
	fn empty_directory_without_metadata_is_an_error() -> Result<()> {
		let dir = TempDir::new()?;
		let root = dir.path().join("3");
		fs::create_dir_all(&root)?;
		assert!(DirectoryDataset::open(&root, &no_clip()).is_err());
		Ok(())
	}
}

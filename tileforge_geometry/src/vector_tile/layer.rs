//! Layer scanning and feature decoding.
//!
//! A layer is read in two passes. The first collects the attribute
//! dictionaries (`keys`, `values`), the extent and the version, counts the
//! features and remembers where the feature messages start. The second pass
//! walks the features once to discover the layer's geometry kind (promoting
//! single kinds to multi when any feature holds several MoveTo groups) and,
//! unless an external schema was supplied, the attribute schema with its
//! widening rules.
//!
//! Feature decoding itself is lazy: [`TileLayer::next_feature`] advances a
//! cursor over the feature messages, and [`TileLayer::reset`] rewinds it to
//! the saved start offset.

use super::clip::clip_geometry;
use super::geometry::{decode_geometry, scan_geometry_kind};
use super::schema::{FieldType, LayerSchema};
use super::value::GeoValuePbf;
use super::{GeomType, GeometryKind, TileGeoreference};
use crate::geo::{GeoFeature, GeoValue, Geometry};
use anyhow::{Context, Result, anyhow, bail, ensure};
use log::{debug, warn};
use tileforge_core::io::{ValueReader, ValueReaderSlice};
use tileforge_core::{Blob, GeoBBox};

/// Options controlling how a single layer is scanned.
#[derive(Clone, Debug, Default)]
pub struct LayerScanOptions {
	/// Externally supplied schema; suppresses the field scan when present.
	pub fields: Option<LayerSchema>,
	/// Externally supplied geometry kind; suppresses the geometry scan when
	/// not `Unknown`.
	pub geometry_hint: GeometryKind,
	/// Clip decoded geometries to the tile envelope.
	pub clip: bool,
}

/// A scanned vector tile layer with a lazy feature cursor.
pub struct TileLayer {
	pub name: String,
	pub extent: u32,
	pub version: u32,
	keys: Vec<String>,
	values: Vec<GeoValue>,
	schema: LayerSchema,
	geom_kind: GeometryKind,
	feature_count: u64,
	data: Blob,
	features_offset: u64,
	cursor: u64,
	next_fid: u64,
	georef: TileGeoreference,
	clip: bool,
	envelope: GeoBBox,
}

impl TileLayer {
	/// Scans a layer message.
	///
	/// # Errors
	/// Fails on malformed framing, a missing/empty/invalid name, an
	/// unsupported version, or out-of-range tag indices encountered while
	/// scanning the schema.
	pub fn read(data: Blob, georef: TileGeoreference, options: &LayerScanOptions) -> Result<TileLayer> {
		let mut name: Option<String> = None;
		let mut extent: u32 = 4096;
		let mut version: u32 = 1;
		let mut keys: Vec<String> = Vec::new();
		let mut values: Vec<GeoValue> = Vec::new();
		let mut feature_count: u64 = 0;
		let mut features_offset: Option<u64> = None;

		// First pass: dictionaries, extent, version; features are skipped.
		let mut reader = ValueReaderSlice::new_le(data.as_slice());
		while reader.has_remaining() {
			let key_offset = reader.position();
			match reader.read_pbf_key().context("Failed to read PBF key")? {
				(1, 2) => name = Some(reader.read_pbf_string().context("Failed to read layer name")?),
				(2, 2) => {
					if features_offset.is_none() {
						features_offset = Some(key_offset);
					}
					let length = reader.read_varint().context("Failed to read feature length")?;
					let position = reader.position();
					reader
						.set_position(position + length)
						.context("Failed to skip feature message")?;
					feature_count += 1;
				}
				(3, 2) => keys.push(reader.read_pbf_string().context("Failed to read property key")?),
				(4, 2) => values.push(
					GeoValue::read(
						reader
							.get_pbf_sub_reader()
							.context("Failed to get sub-reader for property value")?
							.as_mut(),
					)
					.context("Failed to read property value")?,
				),
				(5, 0) => extent = (reader.read_varint().context("Failed to read extent")? as u32).max(1),
				(15, 0) => version = reader.read_varint().context("Failed to read version")? as u32,
				(field, wire_type) => {
					debug!("skipping unknown layer field {field} (wire type {wire_type})");
					reader.skip_pbf_field(wire_type)?;
				}
			}
		}

		let name = name.ok_or_else(|| anyhow!("layer name is required"))?;
		ensure!(!name.is_empty(), "layer name must not be empty");
		ensure!(version == 1 || version == 2, "unsupported layer version ({version})");
		if feature_count == 0 {
			warn!("layer '{name}' has no features");
		}

		let scan_fields = options.fields.is_none();
		let scan_geometries = options.geometry_hint == GeometryKind::Unknown;
		let mut schema = options.fields.clone().unwrap_or_default();
		if scan_fields {
			schema = LayerSchema::new();
		}
		let mut geom_kind: Option<GeometryKind> = None;

		// Second pass: geometry kind and attribute schema.
		if scan_fields || scan_geometries {
			let mut reader = ValueReaderSlice::new_le(data.as_slice());
			reader.set_position(features_offset.unwrap_or(data.len() as u64))?;
			while reader.has_remaining() {
				match reader.read_pbf_key()? {
					(2, 2) => {
						let mut feature = reader.get_pbf_sub_reader()?;
						let mut geom_type = GeomType::Unknown;
						while feature.has_remaining() {
							match feature.read_pbf_key()? {
								(3, 0) => geom_type = GeomType::from(feature.read_varint()?),
								(2, 2) if scan_fields => {
									let mut tags = feature.get_pbf_sub_reader()?;
									while tags.has_remaining() {
										let key_idx = tags.read_varint()? as usize;
										let val_idx = tags.read_varint()? as usize;
										ensure!(key_idx < keys.len(), "invalid tag key index: {key_idx}");
										ensure!(val_idx < values.len(), "invalid tag value index: {val_idx}");
										schema.add_or_merge(&keys[key_idx], FieldType::of_value(&values[val_idx]));
									}
								}
								(4, 2) if scan_geometries && geom_type != GeomType::Unknown => {
									let mut geometry = feature.get_pbf_sub_reader()?;
									let kind = scan_geometry_kind(geometry.as_mut(), geom_type)
										.context("Failed to scan geometry kind")?;
									geom_kind = Some(GeometryKind::merge(geom_kind, kind));
								}
								(_, wire_type) => feature.skip_pbf_field(wire_type)?,
							}
						}
					}
					(_, wire_type) => reader.skip_pbf_field(wire_type)?,
				}
			}
		}

		let geom_kind = if options.geometry_hint == GeometryKind::Unknown {
			geom_kind.unwrap_or_default()
		} else {
			options.geometry_hint
		};

		let features_offset = features_offset.unwrap_or(data.len() as u64);
		let envelope = georef.tile_envelope(extent);
		Ok(TileLayer {
			name,
			extent,
			version,
			keys,
			values,
			schema,
			geom_kind,
			feature_count,
			data,
			features_offset,
			cursor: features_offset,
			next_fid: 0,
			georef,
			clip: options.clip,
			envelope,
		})
	}

	#[must_use]
	pub fn schema(&self) -> &LayerSchema {
		&self.schema
	}

	#[must_use]
	pub fn geometry_kind(&self) -> GeometryKind {
		self.geom_kind
	}

	/// Number of feature messages in the layer (before any clipping).
	#[must_use]
	pub fn feature_count(&self) -> u64 {
		self.feature_count
	}

	/// Rewinds the feature cursor to the first feature.
	pub fn reset(&mut self) {
		self.cursor = self.features_offset;
		self.next_fid = 0;
	}

	/// Decodes and returns the next feature, or `None` at the end of the
	/// layer. Features clipped away entirely are skipped.
	pub fn next_feature(&mut self) -> Result<Option<GeoFeature>> {
		loop {
			let mut reader = ValueReaderSlice::new_le(self.data.as_slice());
			reader.set_position(self.cursor)?;

			let mut found = false;
			while reader.has_remaining() {
				match reader.read_pbf_key().context("Failed to read PBF key")? {
					(2, 2) => {
						found = true;
						break;
					}
					(_, wire_type) => reader.skip_pbf_field(wire_type)?,
				}
			}
			if !found {
				self.cursor = reader.position();
				return Ok(None);
			}

			let mut mvt_id: Option<u64> = None;
			let mut tag_ids: Vec<u32> = Vec::new();
			let mut geom_type = GeomType::Unknown;
			let mut geometry: Option<Geometry> = None;
			{
				let mut feature = reader.get_pbf_sub_reader().context("Failed to read feature message")?;
				while feature.has_remaining() {
					match feature.read_pbf_key()? {
						(1, 0) => mvt_id = Some(feature.read_varint().context("Failed to read feature id")?),
						(2, 2) => tag_ids = feature.read_pbf_packed_uint32().context("Failed to read feature tags")?,
						(3, 0) => geom_type = GeomType::from(feature.read_varint().context("Failed to read geometry type")?),
						(4, 2) if geom_type != GeomType::Unknown => {
							let mut geometry_reader = feature.get_pbf_sub_reader()?;
							geometry = Some(
								decode_geometry(
									geometry_reader.as_mut(),
									geom_type,
									self.geom_kind,
									&self.georef,
									self.extent,
								)
								.context("Failed to decode geometry")?,
							);
						}
						(field, wire_type) => {
							debug!("skipping unknown feature field {field} (wire type {wire_type})");
							feature.skip_pbf_field(wire_type)?;
						}
					}
				}
			}
			self.cursor = reader.position();

			let Some(geometry) = geometry else {
				warn!("feature without geometry in layer '{}'", self.name);
				continue;
			};

			let geometry = if self.clip {
				match clip_geometry(geometry, &self.envelope, self.geom_kind) {
					Some(clipped) => clipped,
					None => continue,
				}
			} else {
				geometry
			};

			let mut feature = GeoFeature::new(self.next_fid, geometry);
			self.next_fid += 1;
			if let Some(id) = mvt_id {
				feature.properties.insert("mvt_id".to_string(), GeoValue::UInt(id));
			}
			for pair in tag_ids.chunks(2) {
				let &[key_idx, val_idx] = pair else {
					bail!("feature tags must come in pairs");
				};
				let (key_idx, val_idx) = (key_idx as usize, val_idx as usize);
				if key_idx >= self.keys.len() || val_idx >= self.values.len() {
					warn!("out-of-range tag pair ({key_idx}, {val_idx}) in layer '{}'", self.name);
					continue;
				}
				let key = &self.keys[key_idx];
				if self.schema.field_index(key).is_some() {
					feature.properties.insert(key.clone(), self.values[val_idx].clone());
				}
			}
			return Ok(Some(feature));
		}
	}

	/// Returns the feature whose assigned id equals `fid`, rewinding and
	/// restoring the cursor around the lookup.
	pub fn feature(&mut self, fid: u64) -> Result<Option<GeoFeature>> {
		let saved_cursor = self.cursor;
		let saved_fid = self.next_fid;
		self.reset();
		let mut result = None;
		while let Some(feature) = self.next_feature()? {
			if feature.id == fid {
				result = Some(feature);
				break;
			}
			if feature.id > fid {
				break;
			}
		}
		self.cursor = saved_cursor;
		self.next_fid = saved_fid;
		Ok(result)
	}
}

impl std::fmt::Debug for TileLayer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TileLayer")
			.field("name", &self.name)
			.field("extent", &self.extent)
			.field("version", &self.version)
			.field("geometry_kind", &self.geom_kind)
			.field("feature_count", &self.feature_count)
			.finish()
	}
}

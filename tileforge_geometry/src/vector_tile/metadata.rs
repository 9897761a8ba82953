//! The sibling `metadata.json` document.
//!
//! Tile trees produced by the usual tooling ship a metadata document whose
//! `json` member is a *stringified* JSON object holding `vector_layers`
//! (layer ids and field type maps) and `tilestats` (per-layer geometry
//! hints). A `bounds` member carries `west,south,east,north` in degrees.
//! When present, these override scan-derived schemas and geometry kinds.

use super::georef::mercator_from_lnglat;
use super::schema::{FieldKind, FieldSubtype, FieldType, LayerSchema};
use super::GeometryKind;
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;
use tileforge_core::GeoBBox;

/// The outer metadata document; `json` is itself a stringified document.
#[derive(Deserialize)]
struct RootDocument {
	bounds: Option<String>,
	json: Option<String>,
}

#[derive(Clone, Debug)]
struct MetadataLayer {
	id: String,
	fields: Option<LayerSchema>,
	geometry: Option<GeometryKind>,
}

/// A parsed metadata document.
#[derive(Clone, Debug, Default)]
pub struct TileMetadata {
	layers: Vec<MetadataLayer>,
	bounds: Option<GeoBBox>,
}

impl TileMetadata {
	/// Parses a metadata document.
	///
	/// # Errors
	/// Fails when the document is not JSON or its embedded `json` member is
	/// not a stringified object with a `vector_layers` array.
	pub fn from_slice(bytes: &[u8]) -> Result<TileMetadata> {
		let root: RootDocument = serde_json::from_slice(bytes).context("Failed to parse metadata document")?;

		let bounds = root.bounds.as_deref().and_then(parse_bounds);

		let embedded = root
			.json
			.ok_or_else(|| anyhow!("metadata document has no 'json' member"))?;
		let embedded: Value = serde_json::from_str(&embedded).context("Failed to parse embedded metadata json")?;

		let vector_layers = embedded
			.get("vector_layers")
			.and_then(Value::as_array)
			.ok_or_else(|| anyhow!("metadata document has no 'vector_layers' array"))?;
		let tilestats = embedded
			.pointer("/tilestats/layers")
			.and_then(Value::as_array)
			.cloned()
			.unwrap_or_default();

		let mut layers = Vec::new();
		for entry in vector_layers {
			let Some(id) = entry.get("id").and_then(Value::as_str) else {
				continue;
			};
			let fields = entry.get("fields").and_then(Value::as_object).map(|map| {
				let mut schema = LayerSchema::new();
				for (name, type_name) in map {
					schema.add_or_merge(name, field_type_from_name(type_name.as_str().unwrap_or("String")));
				}
				schema
			});
			let geometry = tilestats
				.iter()
				.find(|stat| stat.get("layer").and_then(Value::as_str) == Some(id))
				.and_then(|stat| stat.get("geometry"))
				.and_then(Value::as_str)
				.and_then(geometry_kind_from_name);
			layers.push(MetadataLayer {
				id: id.to_string(),
				fields,
				geometry,
			});
		}

		Ok(TileMetadata { layers, bounds })
	}

	/// The advertised layer ids, in document order.
	#[must_use]
	pub fn layer_ids(&self) -> Vec<&str> {
		self.layers.iter().map(|layer| layer.id.as_str()).collect()
	}

	/// The schema for a layer, when the document supplies one with at least
	/// one field. An empty fields object is treated as "schema unknown".
	#[must_use]
	pub fn fields_for(&self, name: &str) -> Option<LayerSchema> {
		let layer = self.layers.iter().find(|layer| layer.id == name)?;
		let schema = layer.fields.clone()?;
		// Only the seeded mvt_id field: the producer did not know the schema.
		(schema.fields().len() > 1).then_some(schema)
	}

	/// The geometry kind hinted by `tilestats`, already promoted to the
	/// multi kind (the hint is unreliable for mixed tiles otherwise).
	#[must_use]
	pub fn geometry_kind_for(&self, name: &str) -> Option<GeometryKind> {
		self.layers.iter().find(|layer| layer.id == name)?.geometry
	}

	/// The dataset extent converted to Mercator meters.
	#[must_use]
	pub fn bounds(&self) -> Option<GeoBBox> {
		self.bounds
	}
}

fn parse_bounds(text: &str) -> Option<GeoBBox> {
	let parts: Vec<f64> = text.split(',').filter_map(|t| t.trim().parse().ok()).collect();
	if parts.len() != 4 {
		return None;
	}
	let min = mercator_from_lnglat(parts[0], parts[1]);
	let max = mercator_from_lnglat(parts[2], parts[3]);
	Some(GeoBBox::new(min[0], min[1], max[0], max[1]))
}

fn field_type_from_name(name: &str) -> FieldType {
	match name {
		"Number" => FieldType::new(FieldKind::Real),
		"Integer" => FieldType::new(FieldKind::Int32),
		"Boolean" => FieldType::with_subtype(FieldKind::Int32, FieldSubtype::Boolean),
		_ => FieldType::new(FieldKind::String),
	}
}

fn geometry_kind_from_name(name: &str) -> Option<GeometryKind> {
	match name {
		"Point" => Some(GeometryKind::MultiPoint),
		"LineString" => Some(GeometryKind::MultiLineString),
		"Polygon" => Some(GeometryKind::MultiPolygon),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn document() -> &'static str {
		r#"{
			"bounds": "-10,-5,10,5",
			"json": "{\"vector_layers\":[{\"id\":\"water\",\"fields\":{\"depth\":\"Number\",\"name\":\"String\",\"tidal\":\"Boolean\"}},{\"id\":\"empty\",\"fields\":{}}],\"tilestats\":{\"layers\":[{\"layer\":\"water\",\"geometry\":\"Polygon\"}]}}"
		}"#
	}

	#[test]
	fn parses_layers_fields_and_geometry() -> Result<()> {
		let metadata = TileMetadata::from_slice(document().as_bytes())?;
		assert_eq!(metadata.layer_ids(), vec!["water", "empty"]);

		let schema = metadata.fields_for("water").unwrap();
		let depth = schema.fields()[schema.field_index("depth").unwrap()].1;
		assert_eq!(depth, FieldType::new(FieldKind::Real));
		let tidal = schema.fields()[schema.field_index("tidal").unwrap()].1;
		assert_eq!(tidal, FieldType::with_subtype(FieldKind::Int32, FieldSubtype::Boolean));

		assert_eq!(metadata.geometry_kind_for("water"), Some(GeometryKind::MultiPolygon));
		assert_eq!(metadata.geometry_kind_for("empty"), None);
		Ok(())
	}

	#[test]
	fn empty_fields_object_means_unknown_schema() -> Result<()> {
		let metadata = TileMetadata::from_slice(document().as_bytes())?;
		assert!(metadata.fields_for("empty").is_none());
		Ok(())
	}

	#[test]
	fn bounds_are_projected() -> Result<()> {
		let metadata = TileMetadata::from_slice(document().as_bytes())?;
		let bounds = metadata.bounds().unwrap();
		assert!(bounds.x_min < 0.0 && bounds.x_max > 0.0);
		assert!(bounds.x_max > 1_000_000.0);
		Ok(())
	}

	#[test]
	fn missing_vector_layers_is_an_error() {
		let result = TileMetadata::from_slice(br#"{"json": "{}"}"#);
		assert!(result.is_err());
	}
}

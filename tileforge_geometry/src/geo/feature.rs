//! Feature records: a geometry plus an ordered set of typed properties.

use super::{GeoValue, Geometry};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Ordered feature properties keyed by attribute name.
pub type GeoProperties = BTreeMap<String, GeoValue>;

/// A decoded feature: an assigned feature id, a geometry and its properties.
///
/// `id` is assigned by the producing layer (sequential within a tile layer,
/// synthesized from the tile address in directory mode). The raw MVT feature
/// id, when present in the wire data, is exposed as the `mvt_id` property.
#[derive(Clone, PartialEq)]
pub struct GeoFeature {
	pub id: u64,
	pub geometry: Geometry,
	pub properties: GeoProperties,
}

impl GeoFeature {
	#[must_use]
	pub fn new(id: u64, geometry: Geometry) -> GeoFeature {
		GeoFeature {
			id,
			geometry,
			properties: GeoProperties::new(),
		}
	}
}

impl Debug for GeoFeature {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GeoFeature")
			.field("id", &self.id)
			.field("geometry", &self.geometry)
			.field("properties", &self.properties)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn properties_are_ordered_by_name() {
		let mut feature = GeoFeature::new(0, Geometry::Point([1.0, 2.0]));
		feature.properties.insert("b".to_string(), GeoValue::from(2u64));
		feature.properties.insert("a".to_string(), GeoValue::from(1u64));
		let names: Vec<&str> = feature.properties.keys().map(String::as_str).collect();
		assert_eq!(names, vec!["a", "b"]);
	}
}

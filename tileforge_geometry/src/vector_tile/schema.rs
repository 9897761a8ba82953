//! Attribute schema discovery and widening.
//!
//! A layer's field schema is either supplied externally (from a metadata
//! document) or discovered by scanning every feature's tag pairs. When the
//! same field name appears with different value kinds, the field widens:
//! any string wins, 32-bit integers widen to 64-bit, integers widen to
//! reals (keeping a Float32 subtype when the source carries one), and the
//! Boolean subtype survives only as long as every occurrence is Boolean.

use crate::geo::GeoValue;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
	String,
	Int32,
	Int64,
	Real,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FieldSubtype {
	#[default]
	None,
	Float32,
	Boolean,
}

/// A field's type: a kind plus an optional subtype refinement.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldType {
	pub kind: FieldKind,
	pub subtype: FieldSubtype,
}

impl FieldType {
	#[must_use]
	pub fn new(kind: FieldKind) -> FieldType {
		FieldType {
			kind,
			subtype: FieldSubtype::None,
		}
	}

	#[must_use]
	pub fn with_subtype(kind: FieldKind, subtype: FieldSubtype) -> FieldType {
		FieldType { kind, subtype }
	}

	/// The field type a single value would produce.
	#[must_use]
	pub fn of_value(value: &GeoValue) -> FieldType {
		match value {
			GeoValue::String(_) => FieldType::new(FieldKind::String),
			GeoValue::Float(_) => FieldType::with_subtype(FieldKind::Real, FieldSubtype::Float32),
			GeoValue::Double(_) => FieldType::new(FieldKind::Real),
			GeoValue::Int(v) => {
				if *v >= i64::from(i32::MIN) && *v <= i64::from(i32::MAX) {
					FieldType::new(FieldKind::Int32)
				} else {
					FieldType::new(FieldKind::Int64)
				}
			}
			GeoValue::UInt(v) => {
				if *v <= i32::MAX as u64 {
					FieldType::new(FieldKind::Int32)
				} else {
					FieldType::new(FieldKind::Int64)
				}
			}
			GeoValue::Bool(_) => FieldType::with_subtype(FieldKind::Int32, FieldSubtype::Boolean),
		}
	}

	/// Widens `self` to also accommodate a value of type `src`.
	pub fn merge(&mut self, src: FieldType) {
		use FieldKind::*;
		if src.kind == String {
			*self = FieldType::new(String);
		} else if self.kind == Int32 && src.kind == Int64 {
			*self = FieldType::new(Int64);
		} else if (self.kind == Int32 || self.kind == Int64) && src.kind == Real {
			*self = FieldType::with_subtype(Real, src.subtype);
		} else if self.kind == Real && src.kind == Real && src.subtype == FieldSubtype::None {
			self.subtype = FieldSubtype::None;
		} else if self.kind == Int32 && src.kind == Int32 && src.subtype == FieldSubtype::None {
			self.subtype = FieldSubtype::None;
		}
	}
}

/// An ordered field schema; field order is the order of first appearance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayerSchema {
	fields: Vec<(String, FieldType)>,
}

impl LayerSchema {
	/// An empty schema, seeded with the `mvt_id` field every layer carries.
	#[must_use]
	pub fn new() -> LayerSchema {
		LayerSchema {
			fields: vec![("mvt_id".to_string(), FieldType::new(FieldKind::Int64))],
		}
	}

	#[must_use]
	pub fn fields(&self) -> &[(String, FieldType)] {
		&self.fields
	}

	#[must_use]
	pub fn field_index(&self, name: &str) -> Option<usize> {
		self.fields.iter().position(|(n, _)| n == name)
	}

	/// Adds a field or widens the existing one of the same name.
	pub fn add_or_merge(&mut self, name: &str, field_type: FieldType) {
		if let Some(index) = self.field_index(name) {
			if self.fields[index].1 != field_type {
				self.fields[index].1.merge(field_type);
			}
		} else {
			self.fields.push((name.to_string(), field_type));
		}
	}

	/// Widens this schema with every field of `other` (used when unioning
	/// schemas across tiles).
	pub fn merge_schema(&mut self, other: &LayerSchema) {
		for (name, field_type) in other.fields.iter().skip(1) {
			self.add_or_merge(name, *field_type);
		}
	}
}

//! Geometry type tags: the wire-level tag and the discovered layer kind.

/// The `type` field of an MVT feature (field 3).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum GeomType {
	#[default]
	Unknown,
	Point,
	LineString,
	Polygon,
}

impl From<u64> for GeomType {
	fn from(value: u64) -> Self {
		match value {
			1 => GeomType::Point,
			2 => GeomType::LineString,
			3 => GeomType::Polygon,
			_ => GeomType::Unknown,
		}
	}
}

/// The geometry kind a layer advertises after scanning its features.
///
/// Scanning promotes single kinds to their multi counterparts when any
/// feature carries more than one MoveTo group; mixing incompatible kinds
/// degrades to `Unknown`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum GeometryKind {
	#[default]
	Unknown,
	Point,
	MultiPoint,
	LineString,
	MultiLineString,
	Polygon,
	MultiPolygon,
}

impl GeometryKind {
	/// The multi (collection) counterpart of this kind.
	#[must_use]
	pub fn collection(self) -> GeometryKind {
		match self {
			GeometryKind::Point => GeometryKind::MultiPoint,
			GeometryKind::LineString => GeometryKind::MultiLineString,
			GeometryKind::Polygon => GeometryKind::MultiPolygon,
			other => other,
		}
	}

	#[must_use]
	pub fn is_multi(self) -> bool {
		matches!(
			self,
			GeometryKind::MultiPoint | GeometryKind::MultiLineString | GeometryKind::MultiPolygon
		)
	}

	/// Merges the kind discovered on one feature into the layer-wide kind.
	#[must_use]
	pub fn merge(existing: Option<GeometryKind>, new: GeometryKind) -> GeometryKind {
		match existing {
			None => new,
			Some(old) if old == new.collection() => old,
			Some(old) if new == old.collection() => new,
			Some(old) if old == new => old,
			Some(_) => GeometryKind::Unknown,
		}
	}
}

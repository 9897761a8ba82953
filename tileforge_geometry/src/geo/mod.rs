//! Core geometry primitives shared by the codec and its consumers.

mod feature;
mod geometry;
mod value;

pub use feature::{GeoFeature, GeoProperties};
pub use geometry::{Geometry, LineCoords, PointCoords, PolygonCoords};
pub use value::GeoValue;

//! Mapbox Vector Tile (MVT) reading.
//!
//! This module implements the read path for the public Mapbox Vector Tile
//! 2.x wire format: a protobuf-framed container of named layers, each
//! holding features with integer-coded geometry command streams and
//! index-coded attributes.
//!
//! The entry point is [`VectorTile::from_slice`]; it scans the tile framing
//! and yields [`TileLayer`]s, which lazily decode features on iteration.

mod clip;
mod geometry;
mod geometry_type;
mod georef;
mod layer;
mod metadata;
mod schema;
mod tile;
mod value;

pub use geometry_type::{GeomType, GeometryKind};
pub use georef::{EARTH_RADIUS, MAX_MERCATOR, TileGeoreference, mercator_from_lnglat, tile_window_for_bbox};
pub use layer::{LayerScanOptions, TileLayer};
pub use metadata::TileMetadata;
pub use schema::{FieldKind, FieldSubtype, FieldType, LayerSchema};
pub use tile::{MAX_TILE_SIZE, TileOptions, VectorTile};

//! Geometry model and Mapbox Vector Tile reader for the tileforge workspace.
//!
//! The crate is split into:
//! - `geo`: geometry primitives ([`Geometry`], [`GeoValue`], [`GeoFeature`]).
//! - `math`: small numeric helpers (signed ring area).
//! - `vector_tile`: the MVT wire codec — tile/layer scanning, attribute
//!   schema discovery, geometry command decoding, WebMercator
//!   georeferencing and tile-envelope clipping.

pub mod geo;
pub mod math;
pub mod vector_tile;

pub use geo::{GeoFeature, GeoProperties, GeoValue, Geometry};

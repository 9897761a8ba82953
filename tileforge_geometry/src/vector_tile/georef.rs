//! WebMercator georeferencing of tile-local coordinates.
//!
//! A tile at address `(z, x, y)` covers a square of side
//! `2·π·R / 2^z` meters; local coordinates in `[0, extent]` map linearly
//! into that square. Without a tile address, decoding falls back to an
//! unprojected local space with the y axis flipped (`y' = extent − y`).

use std::f64::consts::PI;
use tileforge_core::{GeoBBox, TileCoord};

/// Spherical Mercator earth radius in meters.
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Half the extent of the WebMercator plane: `π · R` (≈ 20037508.34 m).
pub const MAX_MERCATOR: f64 = EARTH_RADIUS * PI;

/// Projects longitude/latitude degrees to spherical-Mercator meters.
#[must_use]
pub fn mercator_from_lnglat(lng: f64, lat: f64) -> [f64; 2] {
	[
		EARTH_RADIUS * lng.to_radians(),
		EARTH_RADIUS * (PI / 4.0 + 0.5 * lat.to_radians()).tan().ln(),
	]
}

/// Converts a Mercator envelope into the tile index window it touches at
/// zoom `z`, clamped to the grid. Envelopes far outside the Mercator plane
/// select the full grid.
#[must_use]
pub fn tile_window_for_bbox(bbox: &GeoBBox, z: u8) -> (u32, u32, u32, u32) {
	let grid = 1u32 << z;
	let inside = bbox.x_min >= -10.0 * MAX_MERCATOR
		&& bbox.y_min >= -10.0 * MAX_MERCATOR
		&& bbox.x_max <= 10.0 * MAX_MERCATOR
		&& bbox.y_max <= 10.0 * MAX_MERCATOR;
	if !inside {
		return (0, 0, grid - 1, grid - 1);
	}
	let tile_dim = 2.0 * MAX_MERCATOR / f64::from(grid);
	let min_x = (((bbox.x_min + MAX_MERCATOR) / tile_dim).floor()).max(0.0) as u32;
	let min_y = (((MAX_MERCATOR - bbox.y_max) / tile_dim).floor()).max(0.0) as u32;
	let max_x = ((((bbox.x_max + MAX_MERCATOR) / tile_dim).ceil()) as u32).min(grid - 1);
	let max_y = ((((MAX_MERCATOR - bbox.y_min) / tile_dim).ceil()) as u32).min(grid - 1);
	(min_x.min(grid - 1), min_y.min(grid - 1), max_x, max_y)
}

/// The transform from tile-local integer coordinates to map coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileGeoreference {
	georeferenced: bool,
	tile_dim: f64,
	top_x: f64,
	top_y: f64,
}

impl TileGeoreference {
	/// Georeferences a tile at the given grid address.
	#[must_use]
	pub fn new(coord: &TileCoord) -> TileGeoreference {
		let tile_dim = 2.0 * MAX_MERCATOR / f64::from(coord.grid_size());
		TileGeoreference {
			georeferenced: true,
			tile_dim,
			top_x: -MAX_MERCATOR + f64::from(coord.x) * tile_dim,
			top_y: MAX_MERCATOR - f64::from(coord.y) * tile_dim,
		}
	}

	/// The identity fallback used when no tile address is known.
	#[must_use]
	pub fn unreferenced() -> TileGeoreference {
		TileGeoreference {
			georeferenced: false,
			tile_dim: 0.0,
			top_x: 0.0,
			top_y: 0.0,
		}
	}

	#[must_use]
	pub fn is_georeferenced(&self) -> bool {
		self.georeferenced
	}

	/// Maps a tile-local coordinate to map space.
	#[must_use]
	pub fn to_map(&self, x: i64, y: i64, extent: u32) -> [f64; 2] {
		if self.georeferenced {
			[
				self.top_x + x as f64 * self.tile_dim / f64::from(extent),
				self.top_y - y as f64 * self.tile_dim / f64::from(extent),
			]
		} else {
			[x as f64, f64::from(extent) - y as f64]
		}
	}

	/// The envelope of the tile square `[0, extent]²` in map space.
	#[must_use]
	pub fn tile_envelope(&self, extent: u32) -> GeoBBox {
		let top_left = self.to_map(0, 0, extent);
		let bottom_right = self.to_map(i64::from(extent), i64::from(extent), extent);
		GeoBBox::new(
			top_left[0].min(bottom_right[0]),
			top_left[1].min(bottom_right[1]),
			top_left[0].max(bottom_right[0]),
			top_left[1].max(bottom_right[1]),
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use anyhow::Result;
	use approx::assert_relative_eq;

	#[test]
	fn zoom_zero_covers_the_world() -> Result<()> {
		let georef = TileGeoreference::new(&TileCoord::new(0, 0, 0)?);
		let top_left = georef.to_map(0, 0, 4096);
		assert_relative_eq!(top_left[0], -MAX_MERCATOR);
		assert_relative_eq!(top_left[1], MAX_MERCATOR);

		let center = georef.to_map(2048, 2048, 4096);
		assert_relative_eq!(center[0], 0.0);
		assert_relative_eq!(center[1], 0.0);
		Ok(())
	}

	#[test]
	fn unreferenced_flips_y() {
		let georef = TileGeoreference::unreferenced();
		assert_eq!(georef.to_map(10, 20, 4096), [10.0, 4076.0]);
	}

	#[test]
	fn mercator_projection() {
		let p = mercator_from_lnglat(180.0, 0.0);
		assert_relative_eq!(p[0], MAX_MERCATOR);
		assert_relative_eq!(p[1], 0.0);
	}

	#[test]
	fn tile_window_clamps_to_grid() {
		let bbox = GeoBBox::new(-MAX_MERCATOR, -MAX_MERCATOR, MAX_MERCATOR, MAX_MERCATOR);
		assert_eq!(tile_window_for_bbox(&bbox, 2), (0, 0, 3, 3));

		let tiny = GeoBBox::new(1.0, 1.0, 2.0, 2.0);
		let (min_x, min_y, max_x, max_y) = tile_window_for_bbox(&tiny, 2);
		assert_eq!((min_x, min_y), (2, 1));
		assert_eq!((max_x, max_y), (3, 2));

		let wild = GeoBBox::new(f64::NEG_INFINITY, 0.0, 0.0, 0.0);
		assert_eq!(tile_window_for_bbox(&wild, 1), (0, 0, 1, 1));
	}
}

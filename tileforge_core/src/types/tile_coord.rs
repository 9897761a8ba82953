//! Tile addresses on the WebMercator tile grid.

use anyhow::{Result, ensure};
use std::fmt::{self, Debug};

/// A tile address `(z, x, y)` with zoom level `z` and integer column/row
/// `x`/`y`, both in `[0, 2^z)`.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct TileCoord {
	pub x: u32,
	pub y: u32,
	pub z: u8,
}

impl TileCoord {
	/// Creates a new tile coordinate, checking that `z` and the indices are
	/// within the grid.
	pub fn new(z: u8, x: u32, y: u32) -> Result<TileCoord> {
		ensure!(z <= 30, "zoom level ({z}) must be <= 30");
		let max = 1u32 << z;
		ensure!(x < max, "x ({x}) must be < {max} at zoom {z}");
		ensure!(y < max, "y ({y}) must be < {max} at zoom {z}");
		Ok(TileCoord { x, y, z })
	}

	/// Number of tiles along one axis at this zoom level.
	#[must_use]
	pub fn grid_size(&self) -> u32 {
		1u32 << self.z
	}
}

impl Debug for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_fmt(format_args!("TileCoord({}, [{}, {}])", &self.z, &self.x, &self.y))
	}
}

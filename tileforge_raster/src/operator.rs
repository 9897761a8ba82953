//! The composition operator and its identifier mapping.

use anyhow::{bail, Error};
use std::fmt::{self, Display};
use std::ops::RangeInclusive;
use std::str::FromStr;

/// One of the ten supported composition operators.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CompositionMode {
	#[default]
	SrcOver,
	HsvValue,
	Multiply,
	Screen,
	Overlay,
	HardLight,
	Darken,
	Lighten,
	ColorBurn,
	ColorDodge,
}

impl CompositionMode {
	/// All operators, in identifier order.
	pub const ALL: [CompositionMode; 10] = [
		CompositionMode::SrcOver,
		CompositionMode::HsvValue,
		CompositionMode::Multiply,
		CompositionMode::Screen,
		CompositionMode::Overlay,
		CompositionMode::HardLight,
		CompositionMode::Darken,
		CompositionMode::Lighten,
		CompositionMode::ColorBurn,
		CompositionMode::ColorDodge,
	];

	#[must_use]
	pub fn identifier(self) -> &'static str {
		match self {
			CompositionMode::SrcOver => "src-over",
			CompositionMode::HsvValue => "hsv-value",
			CompositionMode::Multiply => "multiply",
			CompositionMode::Screen => "screen",
			CompositionMode::Overlay => "overlay",
			CompositionMode::HardLight => "hard-light",
			CompositionMode::Darken => "darken",
			CompositionMode::Lighten => "lighten",
			CompositionMode::ColorBurn => "color-burn",
			CompositionMode::ColorDodge => "color-dodge",
		}
	}

	/// The band counts the base raster may have under this operator.
	#[must_use]
	pub fn band_count_range(self) -> RangeInclusive<usize> {
		match self {
			CompositionMode::HsvValue => 3..=4,
			_ => 1..=4,
		}
	}

	/// `true` for the commutative operators whose operands may be swapped so
	/// that the band-richer raster ends up on the base side.
	#[must_use]
	pub fn swaps_operands(self) -> bool {
		matches!(
			self,
			CompositionMode::Multiply | CompositionMode::Screen | CompositionMode::HardLight | CompositionMode::Overlay
		)
	}
}

impl Display for CompositionMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.identifier())
	}
}

impl FromStr for CompositionMode {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		for mode in CompositionMode::ALL {
			if mode.identifier() == s {
				return Ok(mode);
			}
		}
		bail!("invalid composition identifier: {s}");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identifiers_round_trip() {
		for mode in CompositionMode::ALL {
			assert_eq!(mode.identifier().parse::<CompositionMode>().unwrap(), mode);
		}
	}

	#[test]
	fn unknown_identifier_is_an_error() {
		assert!("xor".parse::<CompositionMode>().is_err());
	}

	#[test]
	fn band_ranges() {
		assert_eq!(CompositionMode::HsvValue.band_count_range(), 3..=4);
		assert_eq!(CompositionMode::SrcOver.band_count_range(), 1..=4);
	}

	#[test]
	fn swap_set() {
		assert!(CompositionMode::Multiply.swaps_operands());
		assert!(CompositionMode::Overlay.swaps_operands());
		assert!(!CompositionMode::SrcOver.swaps_operands());
		assert!(!CompositionMode::Darken.swaps_operands());
	}
}

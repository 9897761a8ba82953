//! The pixel source abstraction the blend engine reads from.
//!
//! Concrete storage (files, encoders, remote tiles) lives outside this
//! crate; the engine only needs rectangular window reads of 8-bit samples,
//! one band at a time, plus an optional pre-built overview chain.
//! [`MemoryRaster`] is the reference implementation and the test double.

use anyhow::{Result, ensure};

/// The resampling algorithm requested for a window read.
///
/// Sources decide how to honor it; the blend engine only threads it
/// through and keys its acquisition cache on it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Resampling {
	#[default]
	Nearest,
	Bilinear,
	Cubic,
	Average,
}

/// A rectangular pixel window in source coordinates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Window {
	pub x_off: usize,
	pub y_off: usize,
	pub x_size: usize,
	pub y_size: usize,
}

impl Window {
	#[must_use]
	pub fn new(x_off: usize, y_off: usize, x_size: usize, y_size: usize) -> Window {
		Window {
			x_off,
			y_off,
			x_size,
			y_size,
		}
	}

	/// The full extent of a `width` × `height` raster.
	#[must_use]
	pub fn full(width: usize, height: usize) -> Window {
		Window::new(0, 0, width, height)
	}
}

/// A read-only raster of 8-bit samples with 1 to 4 bands.
///
/// For 2- and 4-band rasters the last band is alpha. Implementations with
/// palette-indexed storage are expected to expand to RGBA before handing
/// the raster to the blend engine.
pub trait RasterSource {
	fn width(&self) -> usize;
	fn height(&self) -> usize;
	fn band_count(&self) -> usize;

	/// Reads `window` of band `band` (0-based) into `buf`, resampled to
	/// `buf_width` × `buf_height` row-major bytes.
	fn read_window(
		&self,
		window: &Window,
		band: usize,
		buf: &mut [u8],
		buf_width: usize,
		buf_height: usize,
		resampling: Resampling,
	) -> Result<()>;

	/// Number of precomputed overview (downsampled) levels.
	fn overview_count(&self) -> usize {
		0
	}

	/// The overview at `level`, finest first.
	fn overview(&self, _level: usize) -> Option<&dyn RasterSource> {
		None
	}
}

/// An in-memory band-planar raster with optional overview pyramid.
pub struct MemoryRaster {
	width: usize,
	height: usize,
	bands: usize,
	data: Vec<u8>,
	overviews: Vec<MemoryRaster>,
}

impl MemoryRaster {
	/// Wraps band-planar `data` (`bands` planes of `width·height` bytes).
	pub fn new(width: usize, height: usize, bands: usize, data: Vec<u8>) -> Result<MemoryRaster> {
		ensure!((1..=4).contains(&bands), "band count ({bands}) must be between 1 and 4");
		ensure!(
			data.len() == width * height * bands,
			"data length ({}) does not match {width}x{height}x{bands}",
			data.len()
		);
		Ok(MemoryRaster {
			width,
			height,
			bands,
			data,
			overviews: Vec::new(),
		})
	}

	/// A raster with every sample of band `i` set to `values[i]`.
	pub fn filled(width: usize, height: usize, values: &[u8]) -> Result<MemoryRaster> {
		let mut data = Vec::with_capacity(width * height * values.len());
		for &value in values {
			data.extend(std::iter::repeat_n(value, width * height));
		}
		MemoryRaster::new(width, height, values.len(), data)
	}

	/// Wraps pixel-interleaved `pixels` (`width·height` groups of `bands`
	/// bytes).
	pub fn from_interleaved(width: usize, height: usize, bands: usize, pixels: &[u8]) -> Result<MemoryRaster> {
		ensure!(
			pixels.len() == width * height * bands,
			"pixel length ({}) does not match {width}x{height}x{bands}",
			pixels.len()
		);
		let plane_len = width * height;
		let mut data = vec![0u8; pixels.len()];
		for (i, chunk) in pixels.chunks_exact(bands).enumerate() {
			for (band, &value) in chunk.iter().enumerate() {
				data[band * plane_len + i] = value;
			}
		}
		MemoryRaster::new(width, height, bands, data)
	}

	/// Attaches a pre-built overview pyramid, finest first.
	#[must_use]
	pub fn with_overviews(mut self, overviews: Vec<MemoryRaster>) -> MemoryRaster {
		self.overviews = overviews;
		self
	}

	fn sample(&self, band: usize, x: usize, y: usize) -> u8 {
		self.data[band * self.width * self.height + y * self.width + x]
	}
}

impl RasterSource for MemoryRaster {
	fn width(&self) -> usize {
		self.width
	}

	fn height(&self) -> usize {
		self.height
	}

	fn band_count(&self) -> usize {
		self.bands
	}

	fn read_window(
		&self,
		window: &Window,
		band: usize,
		buf: &mut [u8],
		buf_width: usize,
		buf_height: usize,
		_resampling: Resampling,
	) -> Result<()> {
		ensure!(band < self.bands, "band ({band}) out of range");
		ensure!(
			window.x_off + window.x_size <= self.width && window.y_off + window.y_size <= self.height,
			"window {window:?} exceeds raster {}x{}",
			self.width,
			self.height
		);
		ensure!(buf.len() >= buf_width * buf_height, "buffer too small");

		// Nearest-neighbour sampling regardless of the requested algorithm.
		for j in 0..buf_height {
			let src_y = window.y_off + (j * window.y_size + window.y_size / 2) / buf_height.max(1);
			let src_y = src_y.min(window.y_off + window.y_size - 1);
			for i in 0..buf_width {
				let src_x = window.x_off + (i * window.x_size + window.x_size / 2) / buf_width.max(1);
				let src_x = src_x.min(window.x_off + window.x_size - 1);
				buf[j * buf_width + i] = self.sample(band, src_x, src_y);
			}
		}
		Ok(())
	}

	fn overview_count(&self) -> usize {
		self.overviews.len()
	}

	fn overview(&self, level: usize) -> Option<&dyn RasterSource> {
		self.overviews.get(level).map(|overview| overview as &dyn RasterSource)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exact_window_read() -> Result<()> {
		let raster = MemoryRaster::new(2, 2, 1, vec![1, 2, 3, 4])?;
		let mut buf = [0u8; 4];
		raster.read_window(&Window::full(2, 2), 0, &mut buf, 2, 2, Resampling::Nearest)?;
		assert_eq!(buf, [1, 2, 3, 4]);

		let mut buf = [0u8; 1];
		raster.read_window(&Window::new(1, 1, 1, 1), 0, &mut buf, 1, 1, Resampling::Nearest)?;
		assert_eq!(buf, [4]);
		Ok(())
	}

	#[test]
	fn downsampled_read_picks_nearest() -> Result<()> {
		let raster = MemoryRaster::new(4, 4, 1, (0u8..16).collect())?;
		let mut buf = [0u8; 4];
		raster.read_window(&Window::full(4, 4), 0, &mut buf, 2, 2, Resampling::Nearest)?;
		// Centers of each 2x2 block.
		assert_eq!(buf, [5, 7, 13, 15]);
		Ok(())
	}

	#[test]
	fn interleaved_construction() -> Result<()> {
		let raster = MemoryRaster::from_interleaved(1, 2, 2, &[10, 200, 20, 100])?;
		let mut gray = [0u8; 2];
		raster.read_window(&Window::full(1, 2), 0, &mut gray, 1, 2, Resampling::Nearest)?;
		assert_eq!(gray, [10, 20]);
		let mut alpha = [0u8; 2];
		raster.read_window(&Window::full(1, 2), 1, &mut alpha, 1, 2, Resampling::Nearest)?;
		assert_eq!(alpha, [200, 100]);
		Ok(())
	}

	#[test]
	fn invalid_construction_is_rejected() {
		assert!(MemoryRaster::new(2, 2, 5, vec![0; 20]).is_err());
		assert!(MemoryRaster::new(2, 2, 1, vec![0; 3]).is_err());
	}
}

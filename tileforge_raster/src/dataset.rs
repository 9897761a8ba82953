//! The virtual blend dataset.
//!
//! A [`BlendDataset`] borrows a base and an overlay raster and exposes
//! rectangular pixel reads whose results combine the two under the
//! configured operator. Reads acquire both operands band-planar into a
//! memoised buffer (keyed on the full request tuple), then dispatch to the
//! fastest applicable kernel; requests that fit a precomputed overview
//! level are delegated to a child dataset built eagerly at construction.
//!
//! I/O and allocation failures are sticky: once a read fails, every later
//! read fails until the dataset is dropped.

use crate::hsv::{hsv_to_rgb, patch_value_line, rgb_to_hs};
use crate::kernels::{Planes, blend_src_over_rgba, kernel_for, src_over_gray};
use crate::operator::CompositionMode;
use crate::source::{RasterSource, Resampling, Window};
use anyhow::{Context, Result, bail, ensure};
use log::trace;

/// Progress callback: receives the fraction done, returns `false` to abort.
pub type ProgressFn = dyn Fn(f64) -> bool;

/// A rectangular read request.
///
/// `pixel_space`, `line_space` and `band_space` are byte strides within the
/// destination buffer; `band_list` selects output bands (0-based) or all
/// bands in natural order when `None`.
#[derive(Clone, Debug)]
pub struct RasterIoRequest {
	pub window: Window,
	pub buf_width: usize,
	pub buf_height: usize,
	pub pixel_space: usize,
	pub line_space: usize,
	pub band_space: usize,
	pub band_list: Option<Vec<usize>>,
	pub resampling: Resampling,
}

impl RasterIoRequest {
	/// A band-planar request: bands are stored one after the other.
	#[must_use]
	pub fn planar(window: Window, buf_width: usize, buf_height: usize) -> RasterIoRequest {
		RasterIoRequest {
			window,
			buf_width,
			buf_height,
			pixel_space: 1,
			line_space: buf_width,
			band_space: buf_width * buf_height,
			band_list: None,
			resampling: Resampling::Nearest,
		}
	}

	/// A pixel-interleaved request for `bands` bands.
	#[must_use]
	pub fn interleaved(window: Window, buf_width: usize, buf_height: usize, bands: usize) -> RasterIoRequest {
		RasterIoRequest {
			window,
			buf_width,
			buf_height,
			pixel_space: bands,
			line_space: bands * buf_width,
			band_space: 1,
			band_list: None,
			resampling: Resampling::Nearest,
		}
	}
}

/// Color interpretation of an output band.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColorInterpretation {
	Gray,
	Red,
	Green,
	Blue,
	Alpha,
}

#[derive(Clone, PartialEq)]
struct CacheKey {
	window: Window,
	buf_width: usize,
	buf_height: usize,
	resampling: Resampling,
}

#[derive(Default)]
struct IoCache {
	key: Option<CacheKey>,
	buffer: Vec<u8>,
	io_error: bool,
}

/// Builds a blend dataset from an operator identifier and an opacity
/// percentage in `0..=100`.
///
/// Palette-indexed single-band rasters must be expanded to RGBA by the
/// caller before blending.
pub fn make_blend<'a>(
	base: &'a dyn RasterSource,
	overlay: &'a dyn RasterSource,
	operator: &str,
	opacity_percent: u32,
) -> Result<BlendDataset<'a>> {
	let mode: CompositionMode = operator.parse()?;
	BlendDataset::new(base, overlay, mode, opacity_percent)
}

/// A virtual raster combining two borrowed rasters under a composition
/// operator.
pub struct BlendDataset<'a> {
	base: &'a dyn RasterSource,
	overlay: &'a dyn RasterSource,
	mode: CompositionMode,
	opacity: u8,
	swapped_opacity: bool,
	width: usize,
	height: usize,
	bands: usize,
	overviews: Vec<BlendDataset<'a>>,
	cache: IoCache,
}

impl<'a> BlendDataset<'a> {
	/// Validates the configuration and assembles the dataset (including its
	/// overview chain).
	pub fn new(
		base: &'a dyn RasterSource,
		overlay: &'a dyn RasterSource,
		mode: CompositionMode,
		opacity_percent: u32,
	) -> Result<BlendDataset<'a>> {
		ensure!(
			(1..=4).contains(&base.band_count()),
			"only 1-band, 2-band, 3-band or 4-band rasters supported as base"
		);
		ensure!(
			(1..=4).contains(&overlay.band_count()),
			"only 1-band, 2-band, 3-band or 4-band rasters supported as overlay"
		);
		ensure!(
			base.width() == overlay.width() && base.height() == overlay.height(),
			"base ({}x{}) and overlay ({}x{}) must have the same dimensions",
			base.width(),
			base.height(),
			overlay.width(),
			overlay.height()
		);
		ensure!(opacity_percent <= 100, "opacity ({opacity_percent}) must be in 0..=100");

		let range = mode.band_count_range();
		ensure!(
			range.contains(&base.band_count()),
			"base has {} band(s), but operator {mode} requires between {} and {} bands",
			base.band_count(),
			range.start(),
			range.end()
		);

		if matches!(mode, CompositionMode::Darken | CompositionMode::Lighten) {
			let color_bands = |count: usize| if count == 2 || count == 4 { count - 1 } else { count };
			ensure!(
				color_bands(base.band_count()) == color_bands(overlay.band_count()),
				"operator {mode} requires the same number of color bands, got {} and {}",
				color_bands(base.band_count()),
				color_bands(overlay.band_count())
			);
		}

		let opacity = ((opacity_percent * 255 + 50) / 100) as u8;

		// Commutative operators assume the band-richer operand on the base
		// side; the opacity moves with the original opaque side.
		let (base, overlay, swapped_opacity) = if mode.swaps_operands() && base.band_count() < overlay.band_count() {
			(overlay, base, true)
		} else {
			(base, overlay, false)
		};

		Ok(Self::assemble(base, overlay, mode, opacity, swapped_opacity))
	}

	fn assemble(
		base: &'a dyn RasterSource,
		overlay: &'a dyn RasterSource,
		mode: CompositionMode,
		opacity: u8,
		swapped_opacity: bool,
	) -> BlendDataset<'a> {
		let bands = if mode == CompositionMode::HsvValue {
			base.band_count()
		} else {
			base.band_count().max(overlay.band_count())
		};

		let mut overviews = Vec::new();
		let count = overlay.overview_count();
		if count > 0 && base.overview_count() == count {
			let mut pairs: Vec<(&dyn RasterSource, &dyn RasterSource)> = Vec::with_capacity(count);
			for level in 0..count {
				let (Some(base_ovr), Some(overlay_ovr)) = (base.overview(level), overlay.overview(level)) else {
					pairs.clear();
					break;
				};
				if base_ovr.width() != overlay_ovr.width()
					|| base_ovr.height() != overlay_ovr.height()
					|| base_ovr.band_count() != base.band_count()
					|| overlay_ovr.band_count() != overlay.band_count()
				{
					pairs.clear();
					break;
				}
				pairs.push((base_ovr, overlay_ovr));
			}
			if pairs.len() == count {
				for (base_ovr, overlay_ovr) in pairs {
					overviews.push(Self::assemble(base_ovr, overlay_ovr, mode, opacity, swapped_opacity));
				}
			}
		}

		BlendDataset {
			base,
			overlay,
			mode,
			opacity,
			swapped_opacity,
			width: base.width(),
			height: base.height(),
			bands,
			overviews,
			cache: IoCache::default(),
		}
	}

	#[must_use]
	pub fn width(&self) -> usize {
		self.width
	}

	#[must_use]
	pub fn height(&self) -> usize {
		self.height
	}

	#[must_use]
	pub fn band_count(&self) -> usize {
		self.bands
	}

	#[must_use]
	pub fn mode(&self) -> CompositionMode {
		self.mode
	}

	#[must_use]
	pub fn overview_count(&self) -> usize {
		self.overviews.len()
	}

	#[must_use]
	pub fn overview(&self, level: usize) -> Option<&BlendDataset<'a>> {
		self.overviews.get(level)
	}

	/// Color interpretation of output band `band` (0-based): gray for the
	/// first band of 1/2-band outputs, alpha for the last band of 2/4-band
	/// outputs, else R/G/B.
	#[must_use]
	pub fn band_color_interp(&self, band: usize) -> ColorInterpretation {
		if self.bands <= 2 && band == 0 {
			ColorInterpretation::Gray
		} else if self.bands == 2 || band == 3 {
			ColorInterpretation::Alpha
		} else {
			match band {
				0 => ColorInterpretation::Red,
				1 => ColorInterpretation::Green,
				_ => ColorInterpretation::Blue,
			}
		}
	}

	fn check_progress(progress: Option<&ProgressFn>, fraction: f64) -> Result<()> {
		if let Some(callback) = progress {
			ensure!(callback(fraction), "user terminated");
		}
		Ok(())
	}

	/// Fetches base and overlay pixels into one band-planar buffer:
	/// base bands first, then overlay bands, each plane
	/// `buf_width · buf_height` bytes.
	fn acquire_source_pixels(
		&mut self,
		window: &Window,
		buf_width: usize,
		buf_height: usize,
		resampling: Resampling,
	) -> Result<()> {
		let key = CacheKey {
			window: *window,
			buf_width,
			buf_height,
			resampling,
		};
		if self.cache.key.as_ref() == Some(&key) {
			return Ok(());
		}

		let base_bands = self.base.band_count();
		let overlay_bands = self.overlay.band_count();
		let total_bands = base_bands + overlay_bands;

		ensure!(buf_width > 0 && buf_height > 0, "empty buffer requested");
		if buf_width > usize::MAX / buf_height / total_bands {
			self.cache = IoCache {
				io_error: true,
				..IoCache::default()
			};
			bail!("out of memory allocating temporary buffer");
		}
		let pixel_count = buf_width * buf_height;
		let needed = pixel_count * total_bands;

		let mut buffer = std::mem::take(&mut self.cache.buffer);
		if buffer.len() < needed {
			if buffer.try_reserve(needed - buffer.len()).is_err() {
				self.cache = IoCache {
					io_error: true,
					..IoCache::default()
				};
				bail!("out of memory allocating temporary buffer");
			}
			buffer.resize(needed, 0);
		}

		trace!("acquire {window:?} into {buf_width}x{buf_height}");
		let fetched = fetch_planes(
			self.base,
			self.overlay,
			window,
			&mut buffer,
			pixel_count,
			buf_width,
			buf_height,
			resampling,
		);
		match fetched {
			Ok(()) => {
				self.cache.buffer = buffer;
				self.cache.key = Some(key);
				Ok(())
			}
			Err(error) => {
				self.cache = IoCache {
					io_error: true,
					..IoCache::default()
				};
				Err(error)
			}
		}
	}

	fn is_natural_band_list(&self, band_list: Option<&[usize]>) -> bool {
		match band_list {
			None => true,
			Some(list) => list.len() == self.bands && list.iter().enumerate().all(|(i, &band)| band == i),
		}
	}

	/// Picks the overview level whose downsampling factor best matches the
	/// requested ratio, or `None` when the request must run at native
	/// resolution.
	fn select_overview(&self, x_size: usize, buf_width: usize) -> Option<usize> {
		if self.overviews.is_empty() || buf_width == 0 {
			return None;
		}
		let ratio = x_size as f64 / buf_width as f64;
		let mut best: Option<(usize, f64)> = None;
		for (level, overview) in self.overviews.iter().enumerate() {
			let factor = self.width as f64 / overview.width as f64;
			if factor <= ratio * 1.2 && best.is_none_or(|(_, best_factor)| factor > best_factor) {
				best = Some((level, factor));
			}
		}
		best.map(|(level, _)| level)
	}

	fn scale_window_to(&self, window: &Window, target_width: usize, target_height: usize) -> Window {
		let x_off = window.x_off * target_width / self.width;
		let y_off = window.y_off * target_height / self.height;
		let x_size = (window.x_size * target_width / self.width).max(1).min(target_width - x_off);
		let y_size = (window.y_size * target_height / self.height)
			.max(1)
			.min(target_height - y_off);
		Window::new(x_off, y_off, x_size, y_size)
	}

	/// Reads a rectangle of blended pixels into `buf`.
	pub fn raster_io(&mut self, request: &RasterIoRequest, buf: &mut [u8], progress: Option<&ProgressFn>) -> Result<()> {
		ensure!(!self.cache.io_error, "dataset is unusable after a previous I/O error");

		let bands_requested = request.band_list.as_ref().map_or(self.bands, Vec::len);
		if let Some(list) = &request.band_list {
			for &band in list {
				ensure!(band < self.bands, "band ({band}) out of range");
			}
		}
		ensure!(bands_requested > 0, "no bands requested");
		ensure!(request.buf_width > 0 && request.buf_height > 0, "empty buffer requested");
		let needed = (request.buf_height - 1) * request.line_space
			+ (request.buf_width - 1) * request.pixel_space
			+ (bands_requested - 1) * request.band_space
			+ 1;
		ensure!(buf.len() >= needed, "buffer too small ({} < {needed})", buf.len());

		// Delegate downsampled requests to the best-fitting overview.
		if request.buf_width < request.window.x_size
			&& request.buf_height < request.window.y_size
			&& let Some(level) = self.select_overview(request.window.x_size, request.buf_width)
		{
			let overview = &mut self.overviews[level];
			let mut scaled = request.clone();
			scaled.window = Window::new(
				request.window.x_off * overview.width / self.width,
				request.window.y_off * overview.height / self.height,
				(request.window.x_size * overview.width / self.width).max(1),
				(request.window.y_size * overview.height / self.height).max(1),
			);
			return overview.raster_io(&scaled, buf, progress);
		}

		let natural = self.is_natural_band_list(request.band_list.as_deref());
		let base_bands = self.base.band_count();
		let overlay_bands = self.overlay.band_count();

		if overlay_bands == 1 && self.opacity == 255 && self.mode == CompositionMode::HsvValue && natural {
			self.acquire_source_pixels(&request.window, request.buf_width, request.buf_height, request.resampling)?;
			return self.hsv_full_read(request, buf, progress);
		}

		if overlay_bands == 4 && base_bands == 4 && self.mode == CompositionMode::SrcOver && natural {
			self.acquire_source_pixels(&request.window, request.buf_width, request.buf_height, request.resampling)?;
			return self.src_over_full_read(request, buf, progress);
		}

		if kernel_for(self.mode).is_some() && natural {
			self.acquire_source_pixels(&request.window, request.buf_width, request.buf_height, request.resampling)?;
			return self.generic_full_read(request, buf, progress);
		}

		// Fallback: band by band.
		let band_list: Vec<usize> = request
			.band_list
			.clone()
			.unwrap_or_else(|| (0..self.bands).collect());
		for (slot, band) in band_list.into_iter().enumerate() {
			self.band_raster_io_inner(band, request, &mut buf[slot * request.band_space..], progress)?;
		}
		Ok(())
	}

	/// HSV-Value full-dataset read: base RGB supplies hue/saturation, the
	/// single overlay band the new value; base alpha passes through.
	fn hsv_full_read(&self, request: &RasterIoRequest, buf: &mut [u8], progress: Option<&ProgressFn>) -> Result<()> {
		let base_bands = self.base.band_count();
		let pixel_count = request.buf_width * request.buf_height;
		let buffer = self.cache.buffer.as_slice();
		let plane_r = &buffer[..pixel_count];
		let plane_g = &buffer[pixel_count..2 * pixel_count];
		let plane_b = &buffer[2 * pixel_count..3 * pixel_count];
		let plane_value = &buffer[base_bands * pixel_count..(base_bands + 1) * pixel_count];

		let contiguous = request.pixel_space == 1
			&& request.line_space >= request.buf_width
			&& request.band_space >= request.line_space * request.buf_height;

		if contiguous {
			let (band0, rest) = buf.split_at_mut(request.band_space);
			let (band1, rest) = rest.split_at_mut(request.band_space);
			let (band2, rest) = rest.split_at_mut(request.band_space);
			for j in 0..request.buf_height {
				let row = j * request.buf_width;
				let dst = j * request.line_space;
				patch_value_line(
					request.buf_width,
					&plane_r[row..],
					&plane_g[row..],
					&plane_b[row..],
					&plane_value[row..],
					Some(&mut band0[dst..dst + request.buf_width]),
					Some(&mut band1[dst..dst + request.buf_width]),
					Some(&mut band2[dst..dst + request.buf_width]),
				);
				if base_bands == 4 {
					let plane_a = &buffer[3 * pixel_count..4 * pixel_count];
					rest[dst..dst + request.buf_width].copy_from_slice(&plane_a[row..row + request.buf_width]);
				}
				Self::check_progress(progress, (j + 1) as f64 / request.buf_height as f64)?;
			}
		} else {
			for j in 0..request.buf_height {
				let mut src_idx = j * request.buf_width;
				let mut offset = j * request.line_space;
				for _ in 0..request.buf_width {
					let (h, s) = rgb_to_hs(
						i32::from(plane_r[src_idx]),
						i32::from(plane_g[src_idx]),
						i32::from(plane_b[src_idx]),
					);
					let (r, g, b) = hsv_to_rgb(h, s, plane_value[src_idx]);
					buf[offset] = r;
					buf[offset + request.band_space] = g;
					buf[offset + 2 * request.band_space] = b;
					if base_bands == 4 {
						let plane_a = &buffer[3 * pixel_count..4 * pixel_count];
						buf[offset + 3 * request.band_space] = plane_a[src_idx];
					}
					src_idx += 1;
					offset += request.pixel_space;
				}
				Self::check_progress(progress, (j + 1) as f64 / request.buf_height as f64)?;
			}
		}
		Ok(())
	}

	/// SRC-OVER fast path for 4-band base over 4-band overlay.
	fn src_over_full_read(
		&self,
		request: &RasterIoRequest,
		buf: &mut [u8],
		progress: Option<&ProgressFn>,
	) -> Result<()> {
		let pixel_count = request.buf_width * request.buf_height;
		let buffer = self.cache.buffer.as_slice();
		let plane = |index: usize| &buffer[index * pixel_count..(index + 1) * pixel_count];

		for j in 0..request.buf_height {
			let row = j * request.buf_width;
			let row_end = row + request.buf_width;
			let dst_row = &mut buf[j * request.line_space..];

			#[allow(unused_mut)]
			let mut processed = 0;
			#[cfg(target_arch = "x86_64")]
			if request.pixel_space == 1 {
				processed = crate::simd::blend_src_over_rgba_sse2(
					&plane(0)[row..row_end],
					&plane(1)[row..row_end],
					&plane(2)[row..row_end],
					&plane(3)[row..row_end],
					&plane(4)[row..row_end],
					&plane(5)[row..row_end],
					&plane(6)[row..row_end],
					&plane(7)[row..row_end],
					dst_row,
					request.band_space,
					request.buf_width,
					self.opacity,
				);
			}
			blend_src_over_rgba(
				&plane(0)[row..row_end],
				&plane(1)[row..row_end],
				&plane(2)[row..row_end],
				&plane(3)[row..row_end],
				&plane(4)[row..row_end],
				&plane(5)[row..row_end],
				&plane(6)[row..row_end],
				&plane(7)[row..row_end],
				&mut dst_row[processed * request.pixel_space..],
				request.pixel_space,
				request.band_space,
				processed,
				request.buf_width,
				self.opacity,
			);
			Self::check_progress(progress, (j + 1) as f64 / request.buf_height as f64)?;
		}
		Ok(())
	}

	/// Generic per-operator kernels at any band combination.
	fn generic_full_read(&self, request: &RasterIoRequest, buf: &mut [u8], progress: Option<&ProgressFn>) -> Result<()> {
		let Some(kernel) = kernel_for(self.mode) else {
			bail!("operator {} has no generic kernel", self.mode);
		};
		let base_bands = self.base.band_count();
		let overlay_bands = self.overlay.band_count();
		let pixel_count = request.buf_width * request.buf_height;
		let buffer = self.cache.buffer.as_slice();
		let base_planes = Planes::from_planar(&buffer[..base_bands * pixel_count], base_bands, pixel_count);
		let overlay_planes = Planes::from_planar(&buffer[base_bands * pixel_count..], overlay_bands, pixel_count);
		let output_bands = base_planes.band_count().max(overlay_planes.band_count());

		for j in 0..request.buf_height {
			let row = j * request.buf_width;
			kernel(
				&base_planes.row(row),
				&overlay_planes.row(row),
				&mut buf[j * request.line_space..],
				request.pixel_space,
				request.band_space,
				0,
				request.buf_width,
				self.opacity,
				output_bands,
				self.swapped_opacity,
			);
			Self::check_progress(progress, (j + 1) as f64 / request.buf_height as f64)?;
		}
		Ok(())
	}

	/// Reads one output band (0-based) into `buf`.
	pub fn band_raster_io(
		&mut self,
		band: usize,
		request: &RasterIoRequest,
		buf: &mut [u8],
		progress: Option<&ProgressFn>,
	) -> Result<()> {
		ensure!(band < self.bands, "band ({band}) out of range");
		ensure!(!self.cache.io_error, "dataset is unusable after a previous I/O error");
		let needed =
			(request.buf_height - 1) * request.line_space + (request.buf_width - 1) * request.pixel_space + 1;
		ensure!(buf.len() >= needed, "buffer too small ({} < {needed})", buf.len());

		// Delegate downsampled requests to the best-fitting overview.
		if request.buf_width < request.window.x_size
			&& request.buf_height < request.window.y_size
			&& let Some(level) = self.select_overview(request.window.x_size, request.buf_width)
		{
			let target_width = self.overviews[level].width;
			let target_height = self.overviews[level].height;
			let mut scaled = request.clone();
			scaled.window = self.scale_window_to(&request.window, target_width, target_height);
			return self.overviews[level].band_raster_io(band, &scaled, buf, progress);
		}

		self.band_raster_io_inner(band, request, buf, progress)
	}

	fn band_raster_io_inner(
		&mut self,
		band: usize,
		request: &RasterIoRequest,
		buf: &mut [u8],
		progress: Option<&ProgressFn>,
	) -> Result<()> {
		let base_bands = self.base.band_count();
		let overlay_bands = self.overlay.band_count();

		// HSV alpha band: the base alpha passes through untouched. A 3-band
		// base has no alpha output band, so reaching here implies 4 bands.
		if band == 3 && self.mode == CompositionMode::HsvValue {
			let mut plane = vec![0u8; request.buf_width * request.buf_height];
			self
				.base
				.read_window(
					&request.window,
					3,
					&mut plane,
					request.buf_width,
					request.buf_height,
					request.resampling,
				)
				.context("Failed to read base alpha band")?;
			scatter_plane(&plane, buf, request);
			return Ok(());
		}

		// 3-band over 3-band SRC-OVER: a plain opacity mix per band.
		if overlay_bands == 3 && base_bands == 3 && self.mode == CompositionMode::SrcOver {
			self.acquire_source_pixels(&request.window, request.buf_width, request.buf_height, request.resampling)?;
			let pixel_count = request.buf_width * request.buf_height;
			let buffer = self.cache.buffer.as_slice();
			let src = &buffer[band * pixel_count..(band + 1) * pixel_count];
			let overlay = &buffer[(base_bands + band) * pixel_count..(base_bands + band + 1) * pixel_count];
			for j in 0..request.buf_height {
				let row = j * request.buf_width;
				if request.pixel_space == 1 {
					src_over_gray(
						&overlay[row..],
						&src[row..],
						&mut buf[j * request.line_space..j * request.line_space + request.buf_width],
						request.buf_width,
						self.opacity,
					);
				} else {
					let mut offset = j * request.line_space;
					for i in 0..request.buf_width {
						let mixed = u32::from(overlay[row + i]) * u32::from(self.opacity)
							+ u32::from(src[row + i]) * u32::from(255 - self.opacity)
							+ 255;
						buf[offset] = (mixed / 256) as u8;
						offset += request.pixel_space;
					}
				}
				Self::check_progress(progress, (j + 1) as f64 / request.buf_height as f64)?;
			}
			return Ok(());
		}

		self.acquire_source_pixels(&request.window, request.buf_width, request.buf_height, request.resampling)?;
		let pixel_count = request.buf_width * request.buf_height;
		let buffer = self.cache.buffer.as_slice();

		if kernel_for(self.mode).is_some() {
			return self.generic_band_read(band, request, buf, progress);
		}

		if self.mode == CompositionMode::SrcOver {
			return self.src_over_band_read(band, request, buf, progress);
		}

		// HSV-Value single-band reads (bands 0..=2).
		let plane_r = &buffer[..pixel_count];
		let plane_g = &buffer[pixel_count..2 * pixel_count];
		let plane_b = &buffer[2 * pixel_count..3 * pixel_count];
		let plane_value = &buffer[base_bands * pixel_count..(base_bands + 1) * pixel_count];

		if overlay_bands == 1 && self.opacity == 255 {
			for j in 0..request.buf_height {
				let row = j * request.buf_width;
				if request.pixel_space == 1 && request.line_space >= request.buf_width {
					let dst = j * request.line_space;
					let out = &mut buf[dst..dst + request.buf_width];
					let (out_r, out_g, out_b) = match band {
						0 => (Some(out), None, None),
						1 => (None, Some(out), None),
						_ => (None, None, Some(out)),
					};
					patch_value_line(
						request.buf_width,
						&plane_r[row..],
						&plane_g[row..],
						&plane_b[row..],
						&plane_value[row..],
						out_r,
						out_g,
						out_b,
					);
				} else {
					let mut offset = j * request.line_space;
					for i in 0..request.buf_width {
						let src_idx = row + i;
						let (h, s) = rgb_to_hs(
							i32::from(plane_r[src_idx]),
							i32::from(plane_g[src_idx]),
							i32::from(plane_b[src_idx]),
						);
						let (r, g, b) = hsv_to_rgb(h, s, plane_value[src_idx]);
						buf[offset] = [r, g, b][band];
						offset += request.pixel_space;
					}
				}
				Self::check_progress(progress, (j + 1) as f64 / request.buf_height as f64)?;
			}
			return Ok(());
		}

		// HSV-Value with a multi-band overlay or reduced opacity: the new
		// value interpolates between the overlay value and the base value.
		let overlay_rgb = (overlay_bands >= 3).then(|| {
			(
				&buffer[base_bands * pixel_count..(base_bands + 1) * pixel_count],
				&buffer[(base_bands + 1) * pixel_count..(base_bands + 2) * pixel_count],
				&buffer[(base_bands + 2) * pixel_count..(base_bands + 3) * pixel_count],
			)
		});
		let overlay_alpha = (overlay_bands == 2 || overlay_bands == 4)
			.then(|| &buffer[(base_bands + overlay_bands - 1) * pixel_count..(base_bands + overlay_bands) * pixel_count]);

		for j in 0..request.buf_height {
			let mut offset = j * request.line_space;
			for i in 0..request.buf_width {
				let src_idx = j * request.buf_width + i;
				let overlay_value = match overlay_rgb {
					Some((r, g, b)) => r[src_idx].max(g[src_idx]).max(b[src_idx]),
					None => plane_value[src_idx],
				};
				let overlay_a = overlay_alpha.map_or(u32::from(self.opacity), |plane| {
					(u32::from(plane[src_idx]) * u32::from(self.opacity) + 255) / 256
				});
				let color_value = plane_r[src_idx].max(plane_g[src_idx]).max(plane_b[src_idx]);

				let (h, s) = rgb_to_hs(
					i32::from(plane_r[src_idx]),
					i32::from(plane_g[src_idx]),
					i32::from(plane_b[src_idx]),
				);
				let target_value = ((u32::from(overlay_value) * overlay_a
					+ u32::from(color_value) * (255 - overlay_a)
					+ 255) / 256) as u8;
				let (r, g, b) = hsv_to_rgb(h, s, target_value);
				buf[offset] = [r, g, b][band.min(2)];
				offset += request.pixel_space;
			}
			Self::check_progress(progress, (j + 1) as f64 / request.buf_height as f64)?;
		}
		Ok(())
	}

	/// Per-pixel evaluation of the generic kernels into a scratch pixel,
	/// keeping only the requested band.
	fn generic_band_read(
		&self,
		band: usize,
		request: &RasterIoRequest,
		buf: &mut [u8],
		progress: Option<&ProgressFn>,
	) -> Result<()> {
		let Some(kernel) = kernel_for(self.mode) else {
			bail!("operator {} has no generic kernel", self.mode);
		};
		let base_bands = self.base.band_count();
		let overlay_bands = self.overlay.band_count();
		let pixel_count = request.buf_width * request.buf_height;
		let buffer = self.cache.buffer.as_slice();
		let base_planes = Planes::from_planar(&buffer[..base_bands * pixel_count], base_bands, pixel_count);
		let overlay_planes = Planes::from_planar(&buffer[base_bands * pixel_count..], overlay_bands, pixel_count);
		let output_bands = base_planes.band_count().max(overlay_planes.band_count());

		let mut scratch = [0u8; 4];
		for j in 0..request.buf_height {
			let mut offset = j * request.line_space;
			for i in 0..request.buf_width {
				let src_idx = j * request.buf_width + i;
				kernel(
					&base_planes,
					&overlay_planes,
					&mut scratch,
					1,
					1,
					src_idx,
					src_idx + 1,
					self.opacity,
					output_bands,
					self.swapped_opacity,
				);
				buf[offset] = scratch[band];
				offset += request.pixel_space;
			}
			Self::check_progress(progress, (j + 1) as f64 / request.buf_height as f64)?;
		}
		Ok(())
	}

	/// Single-band SRC-OVER covering every band combination, including the
	/// luminance fold of an RGB overlay onto a grayscale base.
	fn src_over_band_read(
		&self,
		band: usize,
		request: &RasterIoRequest,
		buf: &mut [u8],
		progress: Option<&ProgressFn>,
	) -> Result<()> {
		let base_bands = self.base.band_count();
		let overlay_bands = self.overlay.band_count();
		let pixel_count = request.buf_width * request.buf_height;
		let buffer = self.cache.buffer.as_slice();
		let plane = |index: usize| &buffer[index * pixel_count..(index + 1) * pixel_count];

		let src = if band < base_bands {
			Some(plane(band))
		} else if band == 3 && base_bands == 2 {
			Some(plane(1))
		} else {
			None
		};
		let src_alpha = match base_bands {
			4 => Some(plane(3)),
			2 => Some(plane(1)),
			_ => None,
		};
		let overlay = if band < overlay_bands {
			Some(plane(base_bands + band))
		} else if band <= 2 {
			Some(plane(base_bands))
		} else {
			None
		};
		let overlay_alpha =
			(overlay_bands == 2 || overlay_bands == 4).then(|| plane(base_bands + overlay_bands - 1));
		let overlay_rgb = (overlay_bands >= 3 && base_bands < 3 && band <= 2).then(|| {
			(plane(base_bands), plane(base_bands + 1), plane(base_bands + 2))
		});

		for j in 0..request.buf_height {
			let mut offset = j * request.line_space;
			for i in 0..request.buf_width {
				let src_idx = j * request.buf_width + i;
				let overlay_a = overlay_alpha.map_or(u32::from(self.opacity), |plane| {
					(u32::from(plane[src_idx]) * u32::from(self.opacity) + 255) / 256
				});
				let src_a = src_alpha.map_or(255, |plane| u32::from(plane[src_idx]));
				let src_a_mul = (src_a * (255 - overlay_a) + 255) / 256;
				let dst_a = overlay_a + src_a_mul;

				if band == 3 {
					buf[offset] = dst_a as u8;
				} else {
					let overlay_value = match overlay_rgb {
						Some((r, g, b)) => rgb_to_grayscale(r[src_idx], g[src_idx], b[src_idx]),
						None => overlay.map_or(255, |plane| u32::from(plane[src_idx])),
					};
					let src_value = src.map_or(255, |plane| u32::from(plane[src_idx]));
					let mut dst = (overlay_value * overlay_a + src_value * src_a_mul + 255) / 256;
					if dst_a != 0 && dst_a != 255 {
						dst = (dst * 255 + dst_a / 2) / dst_a;
					}
					buf[offset] = dst.min(255) as u8;
				}
				offset += request.pixel_space;
			}
			Self::check_progress(progress, (j + 1) as f64 / request.buf_height as f64)?;
		}
		Ok(())
	}
}

/// `R·0.299 + G·0.587 + B·0.114` in fixed point.
fn rgb_to_grayscale(r: u8, g: u8, b: u8) -> u32 {
	(u32::from(r) * 306 + u32::from(g) * 601 + u32::from(b) * 117) / 1024
}

fn scatter_plane(plane: &[u8], buf: &mut [u8], request: &RasterIoRequest) {
	for j in 0..request.buf_height {
		let mut offset = j * request.line_space;
		for i in 0..request.buf_width {
			buf[offset] = plane[j * request.buf_width + i];
			offset += request.pixel_space;
		}
	}
}

#[allow(clippy::too_many_arguments)]
fn fetch_planes(
	base: &dyn RasterSource,
	overlay: &dyn RasterSource,
	window: &Window,
	buffer: &mut [u8],
	pixel_count: usize,
	buf_width: usize,
	buf_height: usize,
	resampling: Resampling,
) -> Result<()> {
	for band in 0..base.band_count() {
		base
			.read_window(
				window,
				band,
				&mut buffer[band * pixel_count..(band + 1) * pixel_count],
				buf_width,
				buf_height,
				resampling,
			)
			.context("Failed to read base pixels")?;
	}
	let offset = base.band_count() * pixel_count;
	for band in 0..overlay.band_count() {
		overlay
			.read_window(
				window,
				band,
				&mut buffer[offset + band * pixel_count..offset + (band + 1) * pixel_count],
				buf_width,
				buf_height,
				resampling,
			)
			.context("Failed to read overlay pixels")?;
	}
	Ok(())
}

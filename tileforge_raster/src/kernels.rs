//! Row-processing kernels, one per composition operator.
//!
//! Every kernel works on premultiplied inputs and shares one parameter
//! shape: optional per-channel planes for base and overlay (an absent
//! plane reads as 255 or replicates red), a destination slice with pixel
//! and band strides, a pixel range `[start, end)`, the opacity byte, the
//! output band count and the swapped-opacity flag.
//!
//! Formulas follow the usual premultiplied compositing algebra, with
//! `Dca` the destination (base) premultiplied component, `Sca` the source
//! (overlay) one, and `Da`/`Sa` their alphas:
//! `Da' = Sa + Da − Sa·Da` throughout.

use crate::math::{INV_DST_A, SHIFT_DIV_DST_A, div255, mul255, premultiply_channels, process_alpha_channels};
use crate::operator::CompositionMode;

/// Optional per-channel planes of one operand.
#[derive(Clone, Copy, Default)]
pub struct Planes<'a> {
	pub r: Option<&'a [u8]>,
	pub g: Option<&'a [u8]>,
	pub b: Option<&'a [u8]>,
	pub a: Option<&'a [u8]>,
}

impl<'a> Planes<'a> {
	/// Splits a band-planar buffer into channel planes for `band_count`
	/// bands of `plane_len` bytes each.
	#[must_use]
	pub fn from_planar(buffer: &'a [u8], band_count: usize, plane_len: usize) -> Planes<'a> {
		let plane = |index: usize| Some(&buffer[index * plane_len..(index + 1) * plane_len]);
		match band_count {
			1 => Planes {
				r: plane(0),
				..Planes::default()
			},
			2 => Planes {
				r: plane(0),
				a: plane(1),
				..Planes::default()
			},
			3 => Planes {
				r: plane(0),
				g: plane(1),
				b: plane(2),
				..Planes::default()
			},
			_ => Planes {
				r: plane(0),
				g: plane(1),
				b: plane(2),
				a: plane(3),
			},
		}
	}

	#[must_use]
	pub fn band_count(&self) -> usize {
		1 + if self.g.is_some() { 2 } else { 0 } + if self.a.is_some() { 1 } else { 0 }
	}

	/// Re-slices every plane to the row starting at `offset`.
	#[must_use]
	pub fn row(&self, offset: usize) -> Planes<'a> {
		let slice = |plane: Option<&'a [u8]>| plane.map(|p| &p[offset..]);
		Planes {
			r: slice(self.r),
			g: slice(self.g),
			b: slice(self.b),
			a: slice(self.a),
		}
	}
}

/// The common signature of the generic operator kernels.
pub type KernelFn = fn(&Planes, &Planes, &mut [u8], usize, usize, usize, usize, u8, usize, bool);

/// The generic kernel for an operator, or `None` for the operators served
/// by dedicated paths (SRC-OVER, HSV-Value).
#[must_use]
pub fn kernel_for(mode: CompositionMode) -> Option<KernelFn> {
	match mode {
		CompositionMode::Multiply => Some(blend_multiply),
		CompositionMode::Screen => Some(blend_screen),
		CompositionMode::Overlay => Some(blend_overlay),
		CompositionMode::HardLight => Some(blend_hard_light),
		CompositionMode::Darken => Some(blend_darken),
		CompositionMode::Lighten => Some(blend_lighten),
		CompositionMode::ColorBurn => Some(blend_color_burn),
		CompositionMode::ColorDodge => Some(blend_color_dodge),
		CompositionMode::SrcOver | CompositionMode::HsvValue => None,
	}
}

struct PixelCtx {
	r: u8,
	g: u8,
	b: u8,
	a: u8,
	overlay_r: u8,
	overlay_g: u8,
	overlay_b: u8,
	overlay_a: u8,
	final_alpha: u8,
}

#[inline]
fn load_pixel(i: usize, base: &Planes, overlay: &Planes, opacity: u8, swapped_opacity: bool) -> PixelCtx {
	let (a, overlay_a, final_alpha) = process_alpha_channels(i, base.a, overlay.a, opacity, swapped_opacity);
	let (r, g, b) = premultiply_channels(i, base.r, base.g, base.b, a);
	let (overlay_r, overlay_g, overlay_b) = premultiply_channels(i, overlay.r, overlay.g, overlay.b, overlay_a);
	PixelCtx {
		r,
		g,
		b,
		a,
		overlay_r,
		overlay_g,
		overlay_b,
		overlay_a,
		final_alpha,
	}
}

#[inline]
fn store_pixel(
	dst: &mut [u8],
	offset: usize,
	band_space: usize,
	output_bands: usize,
	rgb: (u8, u8, u8),
	final_alpha: u8,
) {
	dst[offset] = rgb.0;
	if output_bands == 2 {
		dst[offset + band_space] = final_alpha;
	} else {
		if output_bands >= 3 {
			dst[offset + band_space] = rgb.1;
			dst[offset + 2 * band_space] = rgb.2;
		}
		if output_bands == 4 {
			dst[offset + 3 * band_space] = final_alpha;
		}
	}
}

macro_rules! kernel_loop {
	($base:ident, $overlay:ident, $dst:ident, $pixel_space:ident, $band_space:ident,
	 $start:ident, $end:ident, $opacity:ident, $output_bands:ident, $swapped:ident,
	 |$px:ident| $component:expr) => {{
		let mut offset = 0usize;
		for i in $start..$end {
			let $px = load_pixel(i, $base, $overlay, $opacity, $swapped);
			let component = $component;
			let rgb = if $output_bands >= 3 {
				(
					component($px.r, $px.a, $px.overlay_r, $px.overlay_a),
					component($px.g, $px.a, $px.overlay_g, $px.overlay_a),
					component($px.b, $px.a, $px.overlay_b, $px.overlay_a),
				)
			} else {
				(component($px.r, $px.a, $px.overlay_r, $px.overlay_a), 0, 0)
			};
			store_pixel($dst, offset, $band_space, $output_bands, rgb, $px.final_alpha);
			offset += $pixel_space;
		}
	}};
}

/// MULTIPLY: `Dca' = Sca·Dca + Sca·(1 − Da) + Dca·(1 − Sa)`.
#[allow(clippy::too_many_arguments)]
pub fn blend_multiply(
	base: &Planes,
	overlay: &Planes,
	dst: &mut [u8],
	pixel_space: usize,
	band_space: usize,
	start: usize,
	end: usize,
	opacity: u8,
	output_bands: usize,
	swapped_opacity: bool,
) {
	kernel_loop!(
		base,
		overlay,
		dst,
		pixel_space,
		band_space,
		start,
		end,
		opacity,
		output_bands,
		swapped_opacity,
		|px| {
			let final_alpha = px.final_alpha;
			move |c: u8, a: u8, oc: u8, oa: u8| -> u8 {
				let sum = u32::from(mul255(c, oc)) + u32::from(mul255(c, 255 - oa)) + u32::from(mul255(oc, 255 - a));
				div255(sum as u8, final_alpha)
			}
		}
	);
}

/// SCREEN: `Dca' = Sca + Dca − Sca·Dca`.
#[allow(clippy::too_many_arguments)]
pub fn blend_screen(
	base: &Planes,
	overlay: &Planes,
	dst: &mut [u8],
	pixel_space: usize,
	band_space: usize,
	start: usize,
	end: usize,
	opacity: u8,
	output_bands: usize,
	swapped_opacity: bool,
) {
	kernel_loop!(
		base,
		overlay,
		dst,
		pixel_space,
		band_space,
		start,
		end,
		opacity,
		output_bands,
		swapped_opacity,
		|px| {
			let final_alpha = px.final_alpha;
			move |c: u8, _a: u8, oc: u8, _oa: u8| -> u8 {
				let sum = u32::from(c) + u32::from(oc) - u32::from(mul255(c, oc));
				div255(sum as u8, final_alpha)
			}
		}
	);
}

/// OVERLAY: doubles the product below the destination midpoint, doubles the
/// screen above it.
#[allow(clippy::too_many_arguments)]
pub fn blend_overlay(
	base: &Planes,
	overlay: &Planes,
	dst: &mut [u8],
	pixel_space: usize,
	band_space: usize,
	start: usize,
	end: usize,
	opacity: u8,
	output_bands: usize,
	swapped_opacity: bool,
) {
	kernel_loop!(
		base,
		overlay,
		dst,
		pixel_space,
		band_space,
		start,
		end,
		opacity,
		output_bands,
		swapped_opacity,
		|px| {
			let final_alpha = px.final_alpha;
			let alpha_mul = mul255(px.overlay_a, px.a);
			move |c: u8, a: u8, oc: u8, oa: u8| -> u8 {
				let edges = u32::from(mul255(c, 255 - oa)) + u32::from(mul255(oc, 255 - a));
				let sum = if 2 * u32::from(c) < u32::from(a) {
					// Dca' = 2·Sca·Dca + edges
					2 * u32::from(mul255(c, oc)) + edges
				} else {
					// Dca' = Sa·Da − 2·(Da − Dca)·(Sa − Sca) + edges
					(u32::from(alpha_mul) + edges).wrapping_sub(2 * u32::from(mul255(a - c, oa - oc)))
				};
				div255(sum as u8, final_alpha)
			}
		}
	);
}

/// HARD-LIGHT is OVERLAY with the roles of base and overlay swapped.
#[allow(clippy::too_many_arguments)]
pub fn blend_hard_light(
	base: &Planes,
	overlay: &Planes,
	dst: &mut [u8],
	pixel_space: usize,
	band_space: usize,
	start: usize,
	end: usize,
	opacity: u8,
	output_bands: usize,
	swapped_opacity: bool,
) {
	blend_overlay(
		overlay,
		base,
		dst,
		pixel_space,
		band_space,
		start,
		end,
		opacity,
		output_bands,
		!swapped_opacity,
	);
}

/// DARKEN: `Dca' = min(Sca·Da, Dca·Sa) + Sca·(1 − Da) + Dca·(1 − Sa)`.
#[allow(clippy::too_many_arguments)]
pub fn blend_darken(
	base: &Planes,
	overlay: &Planes,
	dst: &mut [u8],
	pixel_space: usize,
	band_space: usize,
	start: usize,
	end: usize,
	opacity: u8,
	output_bands: usize,
	swapped_opacity: bool,
) {
	kernel_loop!(
		base,
		overlay,
		dst,
		pixel_space,
		band_space,
		start,
		end,
		opacity,
		output_bands,
		swapped_opacity,
		|px| {
			let final_alpha = px.final_alpha;
			move |c: u8, a: u8, oc: u8, oa: u8| -> u8 {
				let sum = u32::from(mul255(oc, a).min(mul255(c, oa)))
					+ u32::from(mul255(c, 255 - oa))
					+ u32::from(mul255(oc, 255 - a));
				div255(sum as u8, final_alpha)
			}
		}
	);
}

/// LIGHTEN: `Dca' = max(Sca·Da, Dca·Sa) + Sca·(1 − Da) + Dca·(1 − Sa)`.
#[allow(clippy::too_many_arguments)]
pub fn blend_lighten(
	base: &Planes,
	overlay: &Planes,
	dst: &mut [u8],
	pixel_space: usize,
	band_space: usize,
	start: usize,
	end: usize,
	opacity: u8,
	output_bands: usize,
	swapped_opacity: bool,
) {
	kernel_loop!(
		base,
		overlay,
		dst,
		pixel_space,
		band_space,
		start,
		end,
		opacity,
		output_bands,
		swapped_opacity,
		|px| {
			let final_alpha = px.final_alpha;
			move |c: u8, a: u8, oc: u8, oa: u8| -> u8 {
				let sum = u32::from(mul255(oc, a).max(mul255(c, oa)))
					+ u32::from(mul255(c, 255 - oa))
					+ u32::from(mul255(oc, 255 - a));
				div255(sum as u8, final_alpha)
			}
		}
	);
}

/// COLOR-DODGE: brightens the destination by the inverse of the source.
#[allow(clippy::too_many_arguments)]
pub fn blend_color_dodge(
	base: &Planes,
	overlay: &Planes,
	dst: &mut [u8],
	pixel_space: usize,
	band_space: usize,
	start: usize,
	end: usize,
	opacity: u8,
	output_bands: usize,
	swapped_opacity: bool,
) {
	kernel_loop!(
		base,
		overlay,
		dst,
		pixel_space,
		band_space,
		start,
		end,
		opacity,
		output_bands,
		swapped_opacity,
		|px| {
			let final_alpha = px.final_alpha;
			let alpha_mul = mul255(px.overlay_a, px.a);
			move |c: u8, a: u8, oc: u8, oa: u8| -> u8 {
				let edges = u32::from(mul255(c, 255 - oa)) + u32::from(mul255(oc, 255 - a));
				let sum = if u32::from(mul255(oc, a)) + u32::from(mul255(c, oa)) >= u32::from(alpha_mul) {
					// Dca' = Sa·Da + edges
					u32::from(alpha_mul) + edges
				} else {
					// Dca' = Dca·Sa / (1 − Sca/Sa) + edges
					u32::from(div255(mul255(c, oa), 255 - div255(oc, oa))) + edges
				};
				div255(sum as u8, final_alpha)
			}
		}
	);
}

/// COLOR-BURN: darkens the destination by the inverse of the source. The
/// above-threshold branch uses the simplified unpremultiplied form.
#[allow(clippy::too_many_arguments)]
pub fn blend_color_burn(
	base: &Planes,
	overlay: &Planes,
	dst: &mut [u8],
	pixel_space: usize,
	band_space: usize,
	start: usize,
	end: usize,
	opacity: u8,
	output_bands: usize,
	swapped_opacity: bool,
) {
	kernel_loop!(
		base,
		overlay,
		dst,
		pixel_space,
		band_space,
		start,
		end,
		opacity,
		output_bands,
		swapped_opacity,
		|px| {
			let final_alpha = px.final_alpha;
			let alpha_mul = mul255(px.overlay_a, px.a);
			move |c: u8, a: u8, oc: u8, oa: u8| -> u8 {
				let edges = u32::from(mul255(c, 255 - oa)) + u32::from(mul255(oc, 255 - a));
				let sum = if u32::from(mul255(oc, a)) + u32::from(mul255(c, oa)) <= u32::from(alpha_mul) {
					// Dca' = edges
					edges
				} else {
					// Dca' = Sa·Da·(Dca/Da + Sca/Sa − 1) + edges
					let c_unpremultiplied = div255(c, a);
					let overlay_c_unpremultiplied = div255(oc, oa);
					let excess =
						(i32::from(c_unpremultiplied) + i32::from(overlay_c_unpremultiplied) - 255) as u8;
					u32::from(mul255(alpha_mul, excess)) + edges
				};
				div255(sum as u8, final_alpha)
			}
		}
	);
}

/// The SRC-OVER fast kernel for full RGBA operands.
#[allow(clippy::too_many_arguments)]
pub fn blend_src_over_rgba(
	r: &[u8],
	g: &[u8],
	b: &[u8],
	a: &[u8],
	overlay_r: &[u8],
	overlay_g: &[u8],
	overlay_b: &[u8],
	overlay_a: &[u8],
	dst: &mut [u8],
	pixel_space: usize,
	band_space: usize,
	start: usize,
	end: usize,
	opacity: u8,
) {
	const ROUND_OFFSET: u32 = (1 << SHIFT_DIV_DST_A) - 1;
	let mut offset = 0usize;
	for i in start..end {
		let n_overlay_a = (u32::from(overlay_a[i]) * u32::from(opacity) + 255) / 256;
		let src_a_mul = (u32::from(a[i]) * (255 - n_overlay_a) + 255) / 256;
		let dst_a = (n_overlay_a + src_a_mul) as u8;
		let blend = |src: u32, overlay: u32| (overlay * n_overlay_a + src * src_a_mul + 255) / 256;
		let dst_r = blend(u32::from(r[i]), u32::from(overlay_r[i]));
		let dst_g = blend(u32::from(g[i]), u32::from(overlay_g[i]));
		let dst_b = blend(u32::from(b[i]), u32::from(overlay_b[i]));
		let inv_dst_a = u32::from(INV_DST_A[dst_a as usize]);
		let unpremultiply = |value: u32| ((value * inv_dst_a + ROUND_OFFSET) >> SHIFT_DIV_DST_A) as u8;
		dst[offset] = unpremultiply(dst_r);
		dst[offset + band_space] = unpremultiply(dst_g);
		dst[offset + 2 * band_space] = unpremultiply(dst_b);
		dst[offset + 3 * band_space] = dst_a;
		offset += pixel_space;
	}
}

/// The single-band SRC-OVER formula used by 3×3 per-band reads:
/// `out = (overlay·opacity + src·(255 − opacity) + 255) / 256`.
pub fn src_over_gray(overlay: &[u8], src: &[u8], dst: &mut [u8], count: usize, opacity: u8) {
	for i in 0..count {
		dst[i] = ((u32::from(overlay[i]) * u32::from(opacity) + u32::from(src[i]) * u32::from(255 - opacity) + 255)
			/ 256) as u8;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn one_pixel(kernel: KernelFn, base: [u8; 4], overlay: [u8; 4], opacity: u8) -> [u8; 4] {
		let base_planes = Planes {
			r: Some(&base[0..1]),
			g: Some(&base[1..2]),
			b: Some(&base[2..3]),
			a: Some(&base[3..4]),
		};
		let overlay_planes = Planes {
			r: Some(&overlay[0..1]),
			g: Some(&overlay[1..2]),
			b: Some(&overlay[2..3]),
			a: Some(&overlay[3..4]),
		};
		let mut out = [0u8; 4];
		kernel(&base_planes, &overlay_planes, &mut out, 4, 1, 0, 1, opacity, 4, false);
		out
	}

	#[test]
	fn multiply_uniform_grays() {
		// mul255(128, 128) = 64 on every color channel.
		let out = one_pixel(blend_multiply, [128, 128, 128, 255], [128, 128, 128, 255], 255);
		assert_eq!(out, [64, 64, 64, 255]);
	}

	#[rstest::rstest]
	#[case(blend_multiply)]
	#[case(blend_screen)]
	#[case(blend_overlay)]
	#[case(blend_hard_light)]
	#[case(blend_darken)]
	#[case(blend_lighten)]
	#[case(blend_color_burn)]
	#[case(blend_color_dodge)]
	fn zero_opacity_keeps_base(#[case] kernel: KernelFn) {
		let out = one_pixel(kernel, [200, 100, 50, 255], [10, 20, 30, 255], 0);
		assert_eq!(&out[0..3], &[200, 100, 50], "kernel changed base at zero opacity");
		assert_eq!(out[3], 255);
	}

	#[test]
	fn screen_of_black_is_identity() {
		let out = one_pixel(blend_screen, [200, 100, 50, 255], [0, 0, 0, 255], 255);
		assert_eq!(out, [200, 100, 50, 255]);
	}

	#[test]
	fn darken_and_lighten_are_commutative_when_opaque() {
		let a = [200u8, 100, 50, 255];
		let b = [90u8, 160, 20, 255];
		assert_eq!(
			one_pixel(blend_darken, a, b, 255),
			one_pixel(blend_darken, b, a, 255)
		);
		assert_eq!(
			one_pixel(blend_lighten, a, b, 255),
			one_pixel(blend_lighten, b, a, 255)
		);
	}

	#[test]
	fn hard_light_swaps_overlay_roles() {
		let a = [200u8, 100, 50, 255];
		let b = [90u8, 160, 20, 255];
		assert_eq!(
			one_pixel(blend_hard_light, a, b, 255),
			one_pixel(blend_overlay, b, a, 255)
		);
	}

	#[test]
	fn grayscale_output_layout() {
		let base = [100u8];
		let base_a = [255u8];
		let overlay = [200u8];
		let planes_base = Planes {
			r: Some(&base),
			a: Some(&base_a),
			..Planes::default()
		};
		let planes_overlay = Planes {
			r: Some(&overlay),
			..Planes::default()
		};
		let mut out = [0u8; 2];
		blend_multiply(&planes_base, &planes_overlay, &mut out, 2, 1, 0, 1, 255, 2, false);
		assert_eq!(out[0], mul255(100, 200));
		assert_eq!(out[1], 255);
	}

	#[test]
	fn src_over_opaque_overlay_wins() {
		let (r, g, b, a) = ([0u8], [0u8], [0u8], [0u8]);
		let (or_, og, ob, oa) = ([255u8], [128u8], [64u8], [255u8]);
		let mut dst = [0u8; 4];
		blend_src_over_rgba(&r, &g, &b, &a, &or_, &og, &ob, &oa, &mut dst, 4, 1, 0, 1, 255);
		assert_eq!(dst, [255, 128, 64, 255]);
	}

	#[test]
	fn src_over_half_red_on_blue() {
		// Opacity byte 128 over an opaque blue base: (128, 0, 127, 255)
		// within one count.
		let (r, g, b, a) = ([0u8], [0u8], [255u8], [255u8]);
		let (or_, og, ob, oa) = ([255u8], [0u8], [0u8], [255u8]);
		let mut dst = [0u8; 4];
		blend_src_over_rgba(&r, &g, &b, &a, &or_, &og, &ob, &oa, &mut dst, 4, 1, 0, 1, 128);
		assert_eq!(dst[3], 255);
		assert!((i32::from(dst[0]) - 128).abs() <= 1, "red was {}", dst[0]);
		assert_eq!(dst[1], 0);
		assert!((i32::from(dst[2]) - 127).abs() <= 1, "blue was {}", dst[2]);
	}

	#[test]
	fn src_over_gray_formula() {
		let overlay = [200u8, 0];
		let src = [100u8, 255];
		let mut dst = [0u8; 2];
		src_over_gray(&overlay, &src, &mut dst, 2, 255);
		assert_eq!(dst, [200, 0]);
		src_over_gray(&overlay, &src, &mut dst, 2, 0);
		assert_eq!(dst, [100, 255]);
	}
}

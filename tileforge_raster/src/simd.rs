//! SSE2 SRC-OVER RGBA kernel.
//!
//! Processes sixteen pixels per iteration with the same widen/multiply/
//! shift sequence as the scalar kernel, including the `INV_DST_A` lookup
//! for the division by destination alpha. Returns the number of pixels
//! processed so the scalar kernel can finish the tail; outputs are
//! byte-identical to the scalar path on all inputs.

use crate::math::INV_DST_A;
use core::arch::x86_64::{
	__m128i, _mm_add_epi16, _mm_extract_epi16, _mm_insert_epi16, _mm_loadu_si128, _mm_mullo_epi16, _mm_packus_epi16,
	_mm_set1_epi16, _mm_setzero_si128, _mm_srli_epi16, _mm_storeu_si128, _mm_sub_epi16, _mm_unpackhi_epi8,
	_mm_unpacklo_epi8,
};

const REG_WIDTH: usize = 16;

#[inline]
unsafe fn load_and_unpack(p: *const u8) -> (__m128i, __m128i) {
	unsafe {
		let zero = _mm_setzero_si128();
		let packed = _mm_loadu_si128(p.cast());
		(_mm_unpacklo_epi8(packed, zero), _mm_unpackhi_epi8(packed, zero))
	}
}

#[inline]
unsafe fn pack_and_store(p: *mut u8, lo: __m128i, hi: __m128i) {
	unsafe { _mm_storeu_si128(p.cast(), _mm_packus_epi16(lo, hi)) }
}

/// `(a · b + 255) >> 8` on eight 16-bit lanes.
#[inline]
unsafe fn mul16bit_8bit_result(a: __m128i, b: __m128i) -> __m128i {
	unsafe {
		let r255 = _mm_set1_epi16(255);
		_mm_srli_epi16::<8>(_mm_add_epi16(_mm_mullo_epi16(a, b), r255))
	}
}

/// Runs the vector kernel over as many full 16-pixel blocks as fit into
/// `n` and returns the number of pixels processed.
///
/// All planes must hold at least `n` bytes; `dst` is written at stride 1
/// per pixel with the four bands `band_space` bytes apart.
#[allow(clippy::too_many_arguments)]
pub fn blend_src_over_rgba_sse2(
	r: &[u8],
	g: &[u8],
	b: &[u8],
	a: &[u8],
	overlay_r: &[u8],
	overlay_g: &[u8],
	overlay_b: &[u8],
	overlay_a: &[u8],
	dst: &mut [u8],
	band_space: usize,
	n: usize,
	opacity: u8,
) -> usize {
	debug_assert!(r.len() >= n && g.len() >= n && b.len() >= n && a.len() >= n);
	debug_assert!(overlay_r.len() >= n && overlay_g.len() >= n && overlay_b.len() >= n && overlay_a.len() >= n);
	debug_assert!(n == 0 || dst.len() >= n + 3 * band_space);

	let mut i = 0;
	if n < REG_WIDTH {
		return 0;
	}

	unsafe {
		let opacity = _mm_set1_epi16(i32::from(opacity) as i16);
		let r255 = _mm_set1_epi16(255);
		let dst_ptr = dst.as_mut_ptr();

		while i + REG_WIDTH <= n {
			let (mut overlay_a_lo, mut overlay_a_hi) = load_and_unpack(overlay_a.as_ptr().add(i));
			let (src_a_lo, src_a_hi) = load_and_unpack(a.as_ptr().add(i));
			overlay_a_lo = mul16bit_8bit_result(overlay_a_lo, opacity);
			overlay_a_hi = mul16bit_8bit_result(overlay_a_hi, opacity);
			let src_a_mul_lo = mul16bit_8bit_result(src_a_lo, _mm_sub_epi16(r255, overlay_a_lo));
			let src_a_mul_hi = mul16bit_8bit_result(src_a_hi, _mm_sub_epi16(r255, overlay_a_hi));
			let dst_a_lo = _mm_add_epi16(overlay_a_lo, src_a_mul_lo);
			let dst_a_hi = _mm_add_epi16(overlay_a_hi, src_a_mul_hi);

			// The gather-equivalent of indexing INV_DST_A by each lane.
			let mut inv_dst_a_lo = _mm_setzero_si128();
			let mut inv_dst_a_hi = _mm_setzero_si128();
			macro_rules! set_inv_dst_a {
				($k:literal) => {
					let idx_lo = _mm_extract_epi16::<$k>(dst_a_lo) as usize;
					let idx_hi = _mm_extract_epi16::<$k>(dst_a_hi) as usize;
					inv_dst_a_lo = _mm_insert_epi16::<$k>(inv_dst_a_lo, i32::from(INV_DST_A[idx_lo] as i16));
					inv_dst_a_hi = _mm_insert_epi16::<$k>(inv_dst_a_hi, i32::from(INV_DST_A[idx_hi] as i16));
				};
			}
			set_inv_dst_a!(0);
			set_inv_dst_a!(1);
			set_inv_dst_a!(2);
			set_inv_dst_a!(3);
			set_inv_dst_a!(4);
			set_inv_dst_a!(5);
			set_inv_dst_a!(6);
			set_inv_dst_a!(7);

			pack_and_store(dst_ptr.add(i + 3 * band_space), dst_a_lo, dst_a_hi);

			macro_rules! process_component {
				($src:expr, $overlay:expr, $band:expr) => {
					let (src_lo, src_hi) = load_and_unpack($src.as_ptr().add(i));
					let (overlay_lo, overlay_hi) = load_and_unpack($overlay.as_ptr().add(i));
					let mut lane_lo = _mm_srli_epi16::<8>(_mm_add_epi16(
						_mm_add_epi16(
							_mm_mullo_epi16(overlay_lo, overlay_a_lo),
							_mm_mullo_epi16(src_lo, src_a_mul_lo),
						),
						r255,
					));
					let mut lane_hi = _mm_srli_epi16::<8>(_mm_add_epi16(
						_mm_add_epi16(
							_mm_mullo_epi16(overlay_hi, overlay_a_hi),
							_mm_mullo_epi16(src_hi, src_a_mul_hi),
						),
						r255,
					));
					lane_lo = mul16bit_8bit_result(lane_lo, inv_dst_a_lo);
					lane_hi = mul16bit_8bit_result(lane_hi, inv_dst_a_hi);
					pack_and_store(dst_ptr.add(i + $band * band_space), lane_lo, lane_hi);
				};
			}
			process_component!(r, overlay_r, 0);
			process_component!(g, overlay_g, 1);
			process_component!(b, overlay_b, 2);

			i += REG_WIDTH;
		}
	}
	i
}

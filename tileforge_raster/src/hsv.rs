//! RGB ↔ HSV conversion and the value-patching row kernel.
//!
//! Hue and saturation travel in `[0, 1]`; value stays a byte. The sextant
//! selection and the `+0.5` rounding of the reconversion are part of the
//! pixel contract.

/// Converts an RGB byte triple to hue and saturation in `[0, 1]`.
#[must_use]
pub fn rgb_to_hs(r: i32, g: i32, b: i32) -> (f32, f32) {
	let (minc, maxc) = if r <= g {
		if r <= b {
			(r, g.max(b))
		} else {
			(b, g)
		}
	} else if g <= b {
		(g, r.max(b))
	} else {
		(b, r)
	};

	let maxc_minus_minc = maxc - minc;
	let s = maxc_minus_minc as f32 / 1.max(maxc) as f32;

	let maxc_minus_minc_times_6 = if maxc_minus_minc == 0 {
		1.0
	} else {
		6.0 * maxc_minus_minc as f32
	};
	let h = if maxc == b {
		4.0 / 6.0 + (r - g) as f32 / maxc_minus_minc_times_6
	} else if maxc == g {
		2.0 / 6.0 + (b - r) as f32 / maxc_minus_minc_times_6
	} else {
		let tmp = (g - b) as f32 / maxc_minus_minc_times_6;
		if tmp < 0.0 { tmp + 1.0 } else { tmp }
	};

	(h, s)
}

fn choose_among(idx: i32, a0: u8, a1: u8, a2: u8, a3: u8, a4: u8, a5: u8) -> u8 {
	match idx {
		0 => a0,
		1 => a1,
		2 => a2,
		3 => a3,
		4 => a4,
		_ => a5,
	}
}

/// Converts hue/saturation in `[0, 1]` and a byte value back to RGB.
#[must_use]
pub fn hsv_to_rgb(h: f32, s: f32, v: u8) -> (u8, u8, u8) {
	let i = (6.0 * h) as i32;
	let f = 6.0 * h - i as f32;
	let vf = f32::from(v);
	let p = (vf * (1.0 - s) + 0.5) as u8;
	let q = (vf * (1.0 - s * f) + 0.5) as u8;
	let t = (vf * (1.0 - s * (1.0 - f)) + 0.5) as u8;

	(
		choose_among(i, v, q, p, p, t, v),
		choose_among(i, t, v, v, q, p, p),
		choose_among(i, p, p, t, v, v, q),
	)
}

/// Replaces the value channel of one row: base RGB provides hue and
/// saturation, the gray plane the new value. Only the requested output
/// planes are written.
#[allow(clippy::too_many_arguments)]
pub fn patch_value_line(
	count: usize,
	in_r: &[u8],
	in_g: &[u8],
	in_b: &[u8],
	in_gray: &[u8],
	mut out_r: Option<&mut [u8]>,
	mut out_g: Option<&mut [u8]>,
	mut out_b: Option<&mut [u8]>,
) {
	for i in 0..count {
		let (h, s) = rgb_to_hs(i32::from(in_r[i]), i32::from(in_g[i]), i32::from(in_b[i]));
		let (r, g, b) = hsv_to_rgb(h, s, in_gray[i]);
		if let Some(out) = out_r.as_deref_mut() {
			out[i] = r;
		}
		if let Some(out) = out_g.as_deref_mut() {
			out[i] = g;
		}
		if let Some(out) = out_b.as_deref_mut() {
			out[i] = b;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn gray_has_zero_saturation() {
		let (_, s) = rgb_to_hs(128, 128, 128);
		assert_eq!(s, 0.0);
	}

	#[test]
	fn value_patch_on_gray_pixel_yields_gray() {
		// Saturation 0: the patched pixel is the new value on all channels.
		let (h, s) = rgb_to_hs(128, 128, 128);
		assert_eq!(hsv_to_rgb(h, s, 200), (200, 200, 200));
	}

	#[test]
	fn round_trip_when_value_is_unchanged() {
		// If the overlay value equals the pixel's own value, the pixel is
		// reproduced exactly.
		for &(r, g, b) in &[(255u8, 0u8, 0u8), (0, 255, 0), (0, 0, 255), (200, 100, 50), (1, 2, 3)] {
			let v = r.max(g).max(b);
			let (h, s) = rgb_to_hs(i32::from(r), i32::from(g), i32::from(b));
			assert_eq!(hsv_to_rgb(h, s, v), (r, g, b), "({r},{g},{b})");
		}
	}

	#[test]
	fn patch_value_line_writes_requested_planes() {
		let in_r = [255u8, 0];
		let in_g = [0u8, 255];
		let in_b = [0u8, 0];
		let gray = [100u8, 100];
		let mut out_r = [0u8; 2];
		let mut out_g = [0u8; 2];
		let mut out_b = [0u8; 2];
		patch_value_line(
			2,
			&in_r,
			&in_g,
			&in_b,
			&gray,
			Some(&mut out_r),
			Some(&mut out_g),
			Some(&mut out_b),
		);
		assert_eq!(out_r, [100, 0]);
		assert_eq!(out_g, [0, 100]);
		assert_eq!(out_b, [0, 0]);
	}
}

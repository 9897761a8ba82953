//! Gzip framing helpers.
//!
//! Vector tiles are frequently stored gzip-framed on disk. The probe checks
//! the two magic bytes (`1F 8B`) so callers can unwrap transparently.

use crate::Blob;
use anyhow::Result;
use flate2::read::{GzDecoder, GzEncoder};
use std::io::Read;

/// `true` if the buffer starts with the gzip magic bytes.
#[must_use]
pub fn is_gzip_compressed(data: &[u8]) -> bool {
	data.len() >= 2 && data[0] == 0x1F && data[1] == 0x8B
}

/// Compresses data using gzip.
pub fn compress_gzip(blob: &Blob) -> Result<Blob> {
	let mut result: Vec<u8> = Vec::new();
	GzEncoder::new(blob.as_slice(), flate2::Compression::best()).read_to_end(&mut result)?;
	Ok(Blob::from(result))
}

/// Decompresses gzip-framed data.
pub fn decompress_gzip(blob: &Blob) -> Result<Blob> {
	let mut result: Vec<u8> = Vec::new();
	GzDecoder::new(blob.as_slice()).read_to_end(&mut result)?;
	Ok(Blob::from(result))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip() -> Result<()> {
		let blob = Blob::from("some tile bytes, repeated repeated repeated");
		let compressed = compress_gzip(&blob)?;
		assert!(is_gzip_compressed(compressed.as_slice()));
		assert_eq!(decompress_gzip(&compressed)?, blob);
		Ok(())
	}

	#[test]
	fn probe_rejects_plain_bytes() {
		assert!(!is_gzip_compressed(b"plain"));
		assert!(!is_gzip_compressed(&[0x1F]));
	}
}

//! The `ValueReader` trait for reading typed values from a byte source.
//!
//! Implementations handle little-endian or big-endian byte order and provide
//! bounded sub-readers for reading embedded messages. On top of the plain
//! integer/float accessors the trait implements the Protocol Buffers
//! primitives used by the vector tile format: varints (wire type 0), 64-bit
//! fields (wire type 1), length-delimited fields (wire type 2) and 32-bit
//! fields (wire type 5).

use crate::Blob;
use anyhow::{Context, Result, bail};
use byteorder::{ByteOrder, ReadBytesExt};
use std::io::{Read, Seek};

/// A simple alias for types implementing both `Seek` and `Read`.
pub trait SeekRead: Seek + Read {}

/// A trait for reading values from a bounded byte source.
pub trait ValueReader<'a, E: ByteOrder + 'a> {
	/// Returns the underlying reader to access raw bytes.
	fn get_reader(&mut self) -> &mut dyn SeekRead;

	/// Returns the total length of the readable data.
	fn len(&self) -> u64;

	/// Returns the current position within the readable data.
	fn position(&mut self) -> u64;

	/// Sets the current position within the readable data.
	fn set_position(&mut self, position: u64) -> Result<()>;

	/// Checks if there is no data to read.
	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns the number of bytes remaining to be read.
	fn remaining(&mut self) -> u64 {
		self.len() - self.position()
	}

	/// Checks if there are any bytes remaining to be read.
	fn has_remaining(&mut self) -> bool {
		self.remaining() > 0
	}

	/// Reads a variable-length unsigned integer (varint).
	///
	/// # Errors
	/// Returns an error on truncation or when the encoding exceeds ten bytes.
	fn read_varint(&mut self) -> Result<u64> {
		let mut value = 0;
		let mut shift = 0;
		loop {
			let byte = self.get_reader().read_u8()?;
			value |= (u64::from(byte) & 0x7F) << shift;
			if byte & 0x80 == 0 {
				break;
			}
			shift += 7;
			if shift >= 70 {
				bail!("varint too long");
			}
		}
		Ok(value)
	}

	/// Reads a zig-zag-encoded signed varint.
	fn read_svarint(&mut self) -> Result<i64> {
		let sint_value = self.read_varint()? as i64;
		Ok((sint_value >> 1) ^ -(sint_value & 1))
	}

	/// Reads a 32-bit floating point number.
	fn read_f32(&mut self) -> Result<f32> {
		Ok(self.get_reader().read_f32::<E>()?)
	}

	/// Reads a 64-bit floating point number.
	fn read_f64(&mut self) -> Result<f64> {
		Ok(self.get_reader().read_f64::<E>()?)
	}

	/// Reads an unsigned 8-bit integer.
	fn read_u8(&mut self) -> Result<u8> {
		Ok(self.get_reader().read_u8()?)
	}

	/// Reads a binary blob of the specified length.
	fn read_blob(&mut self, length: u64) -> Result<Blob> {
		let mut blob = Blob::new_sized(length as usize);
		self.get_reader().read_exact(blob.as_mut_slice())?;
		Ok(blob)
	}

	/// Reads a UTF-8 encoded string of the specified length.
	fn read_string(&mut self, length: u64) -> Result<String> {
		let mut vec = vec![0u8; length as usize];
		self.get_reader().read_exact(&mut vec)?;
		Ok(String::from_utf8(vec)?)
	}

	/// Reads a Protocol Buffers key.
	///
	/// # Returns
	/// A tuple `(field_number, wire_type)`.
	fn read_pbf_key(&mut self) -> Result<(u32, u8)> {
		let value = self.read_varint().context("Failed to read varint for PBF key")?;
		Ok(((value >> 3) as u32, (value & 0x07) as u8))
	}

	/// Returns a sub-reader limited to the given length.
	fn get_sub_reader<'b>(&'b mut self, length: u64) -> Result<Box<dyn ValueReader<'b, E> + 'b>>
	where
		E: 'b;

	/// Returns a sub-reader for a Protocol Buffers embedded message: reads the
	/// length as a varint, then bounds the sub-reader to it.
	fn get_pbf_sub_reader<'b>(&'b mut self) -> Result<Box<dyn ValueReader<'b, E> + 'b>>
	where
		E: 'b,
	{
		let length = self
			.read_varint()
			.context("Failed to read varint for sub-reader length")?;
		self.get_sub_reader(length).context("Failed to get sub-reader")
	}

	/// Reads a packed repeated field of unsigned 32-bit integers.
	fn read_pbf_packed_uint32(&mut self) -> Result<Vec<u32>> {
		let mut reader = self
			.get_pbf_sub_reader()
			.context("Failed to get PBF sub-reader for packed uint32")?;
		let mut values = Vec::new();
		while reader.has_remaining() {
			values.push(
				reader
					.read_varint()
					.context("Failed to read varint for packed uint32")? as u32,
			);
		}
		drop(reader);
		Ok(values)
	}

	/// Reads a Protocol Buffers string field.
	fn read_pbf_string(&mut self) -> Result<String> {
		let length = self.read_varint().context("Failed to read varint for string length")?;
		self.read_string(length).context("Failed to read PBF string")
	}

	/// Reads a Protocol Buffers binary blob field.
	fn read_pbf_blob(&mut self) -> Result<Blob> {
		let length = self.read_varint().context("Failed to read varint for blob length")?;
		self.read_blob(length).context("Failed to read PBF blob")
	}

	/// Skips the payload of a field with the given wire type.
	///
	/// # Errors
	/// Returns an error on truncation or an unknown wire type.
	fn skip_pbf_field(&mut self, wire_type: u8) -> Result<()> {
		match wire_type {
			0 => {
				self.read_varint().context("Failed to skip varint field")?;
			}
			1 => {
				self.read_f64().context("Failed to skip 64-bit field")?;
			}
			2 => {
				let length = self.read_varint().context("Failed to read length of skipped field")?;
				let position = self.position();
				self
					.set_position(position + length)
					.context("Failed to skip length-delimited field")?;
			}
			5 => {
				self.read_f32().context("Failed to skip 32-bit field")?;
			}
			w => bail!("unknown wire type ({w})"),
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::super::ValueReaderSlice;
	use super::*;

	#[rstest::rstest]
	#[case(&[0x00], 0)]
	#[case(&[0x01], 1)]
	#[case(&[0xAC, 0x02], 300)]
	#[case(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01], u64::MAX)]
	fn test_read_varint(#[case] data: &[u8], #[case] expected: u64) {
		let mut reader = ValueReaderSlice::new_le(data);
		assert_eq!(reader.read_varint().unwrap(), expected);
	}

	#[test]
	fn test_read_varint_too_long() {
		let mut reader = ValueReaderSlice::new_le(&[0x80; 11]);
		assert!(reader.read_varint().is_err());
	}

	#[rstest::rstest]
	#[case(&[0x96, 0x01], 75)]
	#[case(&[0x95, 0x01], -75)]
	#[case(&[0x00], 0)]
	#[case(&[0x01], -1)]
	#[case(&[0x02], 1)]
	fn test_read_svarint(#[case] data: &[u8], #[case] expected: i64) {
		let mut reader = ValueReaderSlice::new_le(data);
		assert_eq!(reader.read_svarint().unwrap(), expected);
	}

	#[test]
	fn test_read_f32_le() {
		let mut reader = ValueReaderSlice::new_le(&[0, 0, 0x80, 0x3F]);
		assert_eq!(reader.read_f32().unwrap(), 1.0);
	}

	#[test]
	fn test_read_f64_le() {
		let mut reader = ValueReaderSlice::new_le(&[0, 0, 0, 0, 0, 0, 0xF0, 0x3F]);
		assert_eq!(reader.read_f64().unwrap(), 1.0);
	}

	#[test]
	fn test_read_pbf_key() {
		let mut reader = ValueReaderSlice::new_le(&[0x08]);
		assert_eq!(reader.read_pbf_key().unwrap(), (1, 0));
		let mut reader = ValueReaderSlice::new_le(&[0x1A]);
		assert_eq!(reader.read_pbf_key().unwrap(), (3, 2));
	}

	#[test]
	fn test_read_pbf_string() {
		let mut reader = ValueReaderSlice::new_le(&[0x05, b'h', b'e', b'l', b'l', b'o']);
		assert_eq!(reader.read_pbf_string().unwrap(), "hello");
	}

	#[test]
	fn test_read_pbf_packed_uint32() {
		let mut reader = ValueReaderSlice::new_le(&[0x05, 0x64, 0x96, 0x01, 0xAC, 0x02]);
		assert_eq!(reader.read_pbf_packed_uint32().unwrap(), vec![100, 150, 300]);
	}

	#[test]
	fn test_skip_pbf_field() -> Result<()> {
		// varint, 64-bit, length-delimited, 32-bit; then one real byte
		let data = [
			0x96, 0x01, // varint
			0, 0, 0, 0, 0, 0, 0, 0, // 64-bit
			0x02, 0xAA, 0xBB, // length-delimited
			0, 0, 0, 0,    // 32-bit
			0x2A, // the value we want
		];
		let mut reader = ValueReaderSlice::new_le(&data);
		reader.skip_pbf_field(0)?;
		reader.skip_pbf_field(1)?;
		reader.skip_pbf_field(2)?;
		reader.skip_pbf_field(5)?;
		assert_eq!(reader.read_u8()?, 0x2A);
		Ok(())
	}

	#[test]
	fn test_skip_unknown_wire_type() {
		let mut reader = ValueReaderSlice::new_le(&[0x00]);
		assert!(reader.skip_pbf_field(3).is_err());
		assert!(reader.skip_pbf_field(7).is_err());
	}
}

//! Reading the MVT value message (layer field 4).

use crate::geo::GeoValue;
use anyhow::{Context, Result, anyhow, bail};
use byteorder::LE;
use tileforge_core::io::ValueReader;

/// Extension trait that decodes a [`GeoValue`] from its wire message.
pub trait GeoValuePbf {
	fn read(reader: &mut dyn ValueReader<'_, LE>) -> Result<GeoValue>;
}

impl GeoValuePbf for GeoValue {
	/// Reads one value message. Exactly one of the fields 1..=7 should be
	/// present; when several are, the last one wins.
	fn read(reader: &mut dyn ValueReader<'_, LE>) -> Result<GeoValue> {
		use GeoValue::*;
		let mut value: Option<GeoValue> = None;

		while reader.has_remaining() {
			value = Some(match reader.read_pbf_key().context("Failed to read PBF key")? {
				(1, 2) => String(reader.read_pbf_string().context("Failed to read string value")?),
				(2, 5) => Float(reader.read_f32().context("Failed to read float value")?),
				(3, 1) => Double(reader.read_f64().context("Failed to read double value")?),
				(4, 0) => Int(reader.read_varint().context("Failed to read int value")? as i64),
				(5, 0) => UInt(reader.read_varint().context("Failed to read uint value")?),
				(6, 0) => Int(reader.read_svarint().context("Failed to read sint value")?),
				(7, 0) => Bool(reader.read_varint().context("Failed to read bool value")? != 0),
				(f, w) => bail!("unexpected combination of field number ({f}) and wire type ({w})"),
			});
		}

		value.ok_or_else(|| anyhow!("no value present in value message"))
	}
}

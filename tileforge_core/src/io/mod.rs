//! Binary value readers.
//!
//! The [`ValueReader`] trait provides the primitives the vector tile codec is
//! built on: varints, zig-zag varints, Protocol Buffers field keys and
//! length-delimited payloads. [`ValueReaderSlice`] is the borrowing
//! implementation over a byte slice.

mod value_reader;
mod value_reader_slice;

pub use value_reader::{SeekRead, ValueReader};
pub use value_reader_slice::ValueReaderSlice;

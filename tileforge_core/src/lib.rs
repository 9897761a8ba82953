//! Shared leaf types for the tileforge workspace.
//!
//! This crate holds the pieces every other member builds on:
//! - `types`: [`Blob`], [`TileCoord`] and [`GeoBBox`].
//! - `io`: the [`ValueReader`](io::ValueReader) trait and its slice-backed
//!   implementation, including the Protocol Buffers primitives used by the
//!   vector tile codec.
//! - `utils`: gzip framing helpers.

pub mod io;
pub mod types;
pub mod utils;

pub use types::{Blob, GeoBBox, TileCoord};

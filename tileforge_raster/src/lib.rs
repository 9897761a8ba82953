//! The raster blend engine.
//!
//! [`BlendDataset`] exposes a virtual raster whose pixel reads combine a
//! base and an overlay raster under one of ten composition operators with
//! a caller-supplied opacity. Pixels come from any [`RasterSource`]; the
//! engine works on 8-bit samples with 1 to 4 bands where a trailing band
//! of a 2- or 4-band raster is alpha.
//!
//! The arithmetic is integer-only and bit-exact across the scalar and
//! (on x86_64) SSE2 paths.

mod dataset;
mod hsv;
mod kernels;
mod math;
mod operator;
#[cfg(target_arch = "x86_64")]
mod simd;
mod source;

pub use dataset::{BlendDataset, ColorInterpretation, ProgressFn, RasterIoRequest, make_blend};
pub use operator::CompositionMode;
pub use source::{MemoryRaster, RasterSource, Resampling, Window};

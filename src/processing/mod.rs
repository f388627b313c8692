//! # Processing Module
//!
//! Pure transformation engines. None of them call the pipeline; tools wrap them as
//! their `process` stage.
//!
//! - [`codec`]: raster decode/encode capability and the `image`-crate implementation
//! - [`compressor`]: two-phase search for the best encoding within a byte budget
//! - [`density`]: in-place patching of JPEG/PNG resolution-density metadata

pub mod codec;
pub mod compressor;
pub mod density;

pub use codec::{ImageCodec, OutputFormat, RasterCodec, RasterImage};
pub use compressor::{CompressParams, CompressionRequest, CompressionResult, SizeTargetCompressor};
pub use density::{
    ContainerKind, DensityPatch, DensityReading, DensityRewrite, DensityUnit, MetadataRewriter,
    native_form,
};

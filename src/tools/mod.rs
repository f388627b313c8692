//! # Tools
//!
//! Concrete [`ToolContract`] strategies and the registry that dispatches to them.
//!
//! Each tool is a small immutable value wrapping one engine:
//!
//! | Tool | Engine | Input | Output |
//! |------|--------|-------|--------|
//! | [`CompressTool`] | `SizeTargetCompressor` | `CompressionRequest` | `CompressionResult` |
//! | [`DensityTool`] | `MetadataRewriter` | `DensityRequest` | `DensityRewrite` |
//! | [`DensityProbeTool`] | `MetadataRewriter` | encoded bytes | `DensityReading` |
//! | [`TranscodeTool`] | `Transcoder` | `TranscodeRequest` | `TranscodeOutput` |
//!
//! [`ToolContract`]: crate::pipeline::ToolContract

pub mod compress;
pub mod density;
pub mod registry;
pub mod transcode;

pub use compress::{CompressOptions, CompressTool};
pub use density::{DensityProbeTool, DensityRequest, DensityTool};
pub use registry::{ToolKind, ToolRegistry, ToolRegistryBuilder, ToolRequest, ToolResponse};
pub use transcode::{TranscodeOptions, TranscodeOutput, TranscodeRequest, TranscodeTool};

/// Format a byte count for explanations: `812 B`, `48.2 KB`, `1.50 MB`.
pub fn human_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let value = bytes as f64;
    if value < KB {
        format!("{} B", bytes)
    } else if value < KB * KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{:.2} MB", value / (KB * KB))
    }
}

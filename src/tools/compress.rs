//! Size-targeted image compression as a pipeline tool.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::spawn_blocking;
use tracing::info;

use crate::error::{ToolError, ToolResult};
use crate::pipeline::{CancelToken, ToolContract};
use crate::processing::{CompressionRequest, CompressionResult, OutputFormat, SizeTargetCompressor};
use crate::tools::human_bytes;

/// Per-run knobs for [`CompressTool`].
#[derive(Debug, Clone, Default)]
pub struct CompressOptions {
    /// Checked before every encode.
    pub cancel: Option<CancelToken>,
    /// Return the smallest achievable encoding instead of failing when the budget is unreachable.
    pub accept_infeasible: bool,
}

/// Wraps [`SizeTargetCompressor`]. A fixed target turns it into a preset tool
/// such as "compress image to 50 KB".
#[derive(Debug, Clone)]
pub struct CompressTool {
    name: &'static str,
    compressor: Arc<SizeTargetCompressor>,
    fixed_target: Option<u64>,
}

impl CompressTool {
    pub fn new(name: &'static str, compressor: Arc<SizeTargetCompressor>) -> Self {
        Self {
            name,
            compressor,
            fixed_target: None,
        }
    }

    /// Ignore the request's budget and always use `target_bytes`.
    pub fn with_fixed_target(mut self, target_bytes: u64) -> Self {
        self.fixed_target = Some(target_bytes);
        self
    }

    pub fn fixed_target(&self) -> Option<u64> {
        self.fixed_target
    }
}

#[async_trait]
impl ToolContract for CompressTool {
    type Input = CompressionRequest;
    type Normalized = CompressionRequest;
    type Output = CompressionResult;
    type Options = CompressOptions;

    fn name(&self) -> &str {
        self.name
    }

    fn validate(&self, input: &CompressionRequest) -> ToolResult<()> {
        if input.source.is_empty() {
            return Err(ToolError::validation("source", "must not be empty", "0 bytes"));
        }
        if OutputFormat::sniff(&input.source).is_none() {
            return Err(ToolError::validation(
                "source",
                "not a JPEG, PNG or WebP image",
                format!("{} bytes", input.source.len()),
            ));
        }
        if self.fixed_target.is_none() && input.target_bytes == 0 {
            return Err(ToolError::validation("target_bytes", "must be greater than 0", "0"));
        }
        Ok(())
    }

    fn normalize(&self, mut input: CompressionRequest) -> CompressionRequest {
        if let Some(target) = self.fixed_target {
            input.target_bytes = target;
        }
        input.format = Some(input.resolved_format());
        input
    }

    async fn process(
        &self,
        input: CompressionRequest,
        options: &CompressOptions,
    ) -> ToolResult<CompressionResult> {
        let compressor = Arc::clone(&self.compressor);
        let cancel = options.cancel.clone();
        let result =
            spawn_blocking(move || compressor.compress_bytes(&input, cancel.as_ref())).await??;

        if result.infeasible && !options.accept_infeasible {
            return Err(ToolError::infeasible(result.target_bytes, result.len() as u64)
                .with_operation(self.name)
                .with_recovery_suggestion(
                    "Raise the byte budget, allow resizing, or accept the smallest achievable output",
                ));
        }
        info!(
            tool = self.name,
            size = result.len(),
            target = result.target_bytes,
            infeasible = result.infeasible,
            "compression finished"
        );
        Ok(result)
    }

    fn verify(&self, output: &CompressionResult) -> ToolResult<()> {
        if output.is_empty() {
            return Err(ToolError::integrity("non-empty output", "encoder produced 0 bytes"));
        }
        if output.width == 0 || output.height == 0 {
            return Err(ToolError::integrity(
                "dimensions",
                format!("degenerate {}x{} output", output.width, output.height),
            ));
        }
        if OutputFormat::sniff(&output.encoded_bytes) != Some(output.format) {
            return Err(ToolError::integrity(
                "container signature",
                format!("output does not start with a {} signature", output.format),
            ));
        }
        if !output.infeasible && output.len() as u64 > output.target_bytes {
            return Err(ToolError::integrity(
                "byte budget",
                format!("{} bytes exceeds target of {}", output.len(), output.target_bytes),
            ));
        }
        Ok(())
    }

    fn explain(&self, output: &CompressionResult) -> String {
        let mut text = format!(
            "Compressed to {} {} (target {}) at {}x{}",
            human_bytes(output.len() as u64),
            output.format,
            human_bytes(output.target_bytes),
            output.width,
            output.height,
        );
        if output.format.is_lossy() {
            text.push_str(&format!(", quality {:.0}%", output.quality_used * 100.0));
        }
        if output.was_resized() {
            text.push_str(&format!(", scaled to {:.0}% of the original", output.scale * 100.0));
        }
        if output.infeasible {
            text.push_str("; target unreachable, smallest achievable output returned");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressionConfig;
    use crate::pipeline::{PipelineRunner, PipelineStage};
    use crate::processing::ImageCodec;

    fn tool() -> CompressTool {
        let compressor =
            SizeTargetCompressor::new(Arc::new(ImageCodec::new()), CompressionConfig::default()).unwrap();
        CompressTool::new("compress-image", Arc::new(compressor))
    }

    fn sample(format: image::ImageFormat) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(64, 48, |x, y| {
            image::Rgba([(x * 4) as u8, (y * 5) as u8, ((x + y) * 2) as u8, 255])
        });
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_compresses_real_jpeg_under_budget() {
        let request = CompressionRequest::new(sample(image::ImageFormat::Jpeg), 2_000);
        let result = PipelineRunner::new().run(&tool(), request, None).await;

        let explanation = result.explanation().unwrap().to_string();
        let data = result.into_data().unwrap();
        assert!(data.len() <= 2_000);
        assert_eq!(data.format, OutputFormat::Jpeg);
        assert!(explanation.starts_with("Compressed to"));
    }

    #[tokio::test]
    async fn test_non_image_rejected_at_validation() {
        let request = CompressionRequest::new(b"%PDF-1.7 not an image".to_vec(), 2_000);
        let result = PipelineRunner::new().run(&tool(), request, None).await;
        assert_eq!(result.failed_at(), Some(PipelineStage::Validate));
    }

    #[tokio::test]
    async fn test_infeasible_surfaces_as_distinct_error() {
        let request = CompressionRequest::new(sample(image::ImageFormat::Png), 10).without_resizing();
        let result = PipelineRunner::new().run(&tool(), request, None).await;
        assert_eq!(result.error().unwrap().category(), "infeasible");

        let request = CompressionRequest::new(sample(image::ImageFormat::Png), 10).without_resizing();
        let options = CompressOptions {
            accept_infeasible: true,
            ..CompressOptions::default()
        };
        let result = PipelineRunner::new().run(&tool(), request, Some(options)).await;
        let data = result.data().unwrap();
        assert!(data.infeasible);
        assert_eq!(data.format, OutputFormat::Png);
        assert!(result.explanation().unwrap().contains("target unreachable"));
    }

    #[tokio::test]
    async fn test_fixed_target_overrides_request() {
        let preset = tool().with_fixed_target(4_096);
        let request = CompressionRequest::new(sample(image::ImageFormat::Jpeg), 0);
        let result = PipelineRunner::new().run(&preset, request, None).await;
        assert_eq!(result.data().unwrap().target_bytes, 4_096);
    }

    #[test]
    fn test_verify_rejects_wrong_signature() {
        let output = CompressionResult {
            encoded_bytes: vec![1, 2, 3, 4],
            quality_used: 0.5,
            width: 1,
            height: 1,
            infeasible: false,
            format: OutputFormat::Jpeg,
            scale: 1.0,
            probes: 1,
            target_bytes: 100,
        };
        assert_eq!(tool().verify(&output).unwrap_err().category(), "integrity");
    }
}

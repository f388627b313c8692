//! # Tool Registry
//!
//! An immutable map from tool identifier to a tagged tool strategy, built once and
//! passed by reference. Dispatch is a `match` over [`ToolKind`], so every pairing of
//! tool and request is checked at compile time; a mismatched pairing at runtime is a
//! validation failure, never a panic.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::config::{TargetPreset, ToolbenchConfig};
use crate::error::{ToolError, ToolResult};
use crate::pipeline::{ExecutionResult, PipelineRunner, PipelineStage};
use crate::processing::{
    CompressionRequest, CompressionResult, DensityReading, DensityRewrite, MetadataRewriter,
    RasterCodec, SizeTargetCompressor,
};
use crate::tools::{
    CompressOptions, CompressTool, DensityProbeTool, DensityRequest, DensityTool, TranscodeOptions,
    TranscodeOutput, TranscodeRequest, TranscodeTool,
};
use crate::transcode::Transcoder;

pub const COMPRESS_IMAGE: &str = "compress-image";
pub const IMAGE_DPI_CHANGER: &str = "image-dpi-changer";
pub const IMAGE_DPI_CHECKER: &str = "image-dpi-checker";
pub const TRANSCODE_MEDIA: &str = "transcode-media";

/// One registered tool strategy.
#[derive(Debug, Clone)]
pub enum ToolKind {
    Compress(CompressTool),
    Density(DensityTool),
    DensityProbe(DensityProbeTool),
    Transcode(TranscodeTool),
}

impl ToolKind {
    pub fn description(&self) -> String {
        match self {
            ToolKind::Compress(tool) => match tool.fixed_target() {
                Some(bytes) => format!(
                    "Compress an image to at most {}",
                    crate::tools::human_bytes(bytes)
                ),
                None => "Compress an image to a byte budget".to_string(),
            },
            ToolKind::Density(_) => "Set the DPI stored in a JPEG or PNG".to_string(),
            ToolKind::DensityProbe(_) => "Read the DPI stored in a JPEG or PNG".to_string(),
            ToolKind::Transcode(_) => "Transcode audio or video with ffmpeg".to_string(),
        }
    }
}

/// Input for [`ToolRegistry::dispatch`], tagged by the kind of tool it is meant for.
#[derive(Debug, Clone)]
pub enum ToolRequest {
    Compress {
        request: CompressionRequest,
        options: CompressOptions,
    },
    Density(DensityRequest),
    DensityProbe(Vec<u8>),
    Transcode {
        request: TranscodeRequest,
        options: TranscodeOptions,
    },
}

impl ToolRequest {
    fn kind_name(&self) -> &'static str {
        match self {
            ToolRequest::Compress { .. } => "compress",
            ToolRequest::Density(_) => "density",
            ToolRequest::DensityProbe(_) => "density probe",
            ToolRequest::Transcode { .. } => "transcode",
        }
    }
}

/// Output of [`ToolRegistry::dispatch`].
#[derive(Debug, Clone)]
pub enum ToolResponse {
    Compressed(CompressionResult),
    DensitySet(DensityRewrite),
    DensityRead(DensityReading),
    Transcoded(TranscodeOutput),
}

impl ToolResponse {
    /// The bytes a caller would write out, if the tool produces a file.
    pub fn output_bytes(&self) -> Option<&[u8]> {
        match self {
            ToolResponse::Compressed(r) => Some(&r.encoded_bytes),
            ToolResponse::DensitySet(r) => Some(&r.patched_bytes),
            ToolResponse::DensityRead(_) => None,
            ToolResponse::Transcoded(r) => Some(&r.bytes),
        }
    }
}

/// Immutable identifier → tool map.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, ToolKind>,
}

/// Collects registrations; [`ToolRegistryBuilder::build`] rejects duplicate ids.
#[derive(Debug, Default)]
pub struct ToolRegistryBuilder {
    tools: BTreeMap<&'static str, ToolKind>,
    duplicates: Vec<&'static str>,
}

impl ToolRegistryBuilder {
    pub fn register(mut self, id: &'static str, tool: ToolKind) -> Self {
        if self.tools.insert(id, tool).is_some() {
            self.duplicates.push(id);
        }
        self
    }

    pub fn build(self) -> ToolResult<ToolRegistry> {
        if !self.duplicates.is_empty() {
            return Err(ToolError::validation(
                "tool id",
                "registered more than once",
                self.duplicates.join(", "),
            ));
        }
        Ok(ToolRegistry { tools: self.tools })
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// The built-in catalog: free-form and preset compression, density set and
    /// read, and media transcoding.
    pub fn standard(
        config: &ToolbenchConfig,
        codec: Arc<dyn RasterCodec>,
        transcoder: Arc<dyn Transcoder>,
    ) -> ToolResult<Self> {
        let compressor = Arc::new(SizeTargetCompressor::new(codec, config.compression.clone())?);
        let rewriter = MetadataRewriter::from_config(&config.density);

        let mut builder = Self::builder().register(
            COMPRESS_IMAGE,
            ToolKind::Compress(CompressTool::new(COMPRESS_IMAGE, Arc::clone(&compressor))),
        );
        for preset in TargetPreset::ALL {
            let tool = CompressTool::new(preset.tool_id(), Arc::clone(&compressor))
                .with_fixed_target(preset.bytes());
            builder = builder.register(preset.tool_id(), ToolKind::Compress(tool));
        }
        builder
            .register(IMAGE_DPI_CHANGER, ToolKind::Density(DensityTool::new(rewriter)))
            .register(IMAGE_DPI_CHECKER, ToolKind::DensityProbe(DensityProbeTool::new(rewriter)))
            .register(TRANSCODE_MEDIA, ToolKind::Transcode(TranscodeTool::new(transcoder)))
            .build()
    }

    pub fn get(&self, id: &str) -> Option<&ToolKind> {
        self.tools.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tools.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// `(id, description)` pairs in id order.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        self.tools
            .iter()
            .map(|(id, kind)| (*id, kind.description()))
            .collect()
    }

    /// Run the tool registered under `id`. Always yields an `ExecutionResult`.
    pub async fn dispatch(
        &self,
        runner: &PipelineRunner,
        id: &str,
        request: ToolRequest,
    ) -> ExecutionResult<ToolResponse> {
        let started = Instant::now();
        let Some(kind) = self.tools.get(id) else {
            let error = ToolError::validation("tool id", "no tool registered under this id", id);
            return ExecutionResult::failed(started, error, PipelineStage::Validate);
        };
        debug!(tool = id, request = request.kind_name(), "dispatching");

        match (kind, request) {
            (ToolKind::Compress(tool), ToolRequest::Compress { request, options }) => runner
                .run(tool, request, Some(options))
                .await
                .map(ToolResponse::Compressed),
            (ToolKind::Density(tool), ToolRequest::Density(request)) => runner
                .run(tool, request, None)
                .await
                .map(ToolResponse::DensitySet),
            (ToolKind::DensityProbe(tool), ToolRequest::DensityProbe(bytes)) => runner
                .run(tool, bytes, None)
                .await
                .map(ToolResponse::DensityRead),
            (ToolKind::Transcode(tool), ToolRequest::Transcode { request, options }) => runner
                .run(tool, request, Some(options))
                .await
                .map(ToolResponse::Transcoded),
            (_, request) => {
                let error = ToolError::validation(
                    "request",
                    "does not match the tool's input kind",
                    request.kind_name(),
                );
                ExecutionResult::failed(started, error, PipelineStage::Validate)
            }
        }
    }
}

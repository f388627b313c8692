//! Density read and write tools.

use async_trait::async_trait;

use crate::error::{ToolError, ToolResult};
use crate::pipeline::ToolContract;
use crate::processing::{
    ContainerKind, DensityPatch, DensityReading, DensityRewrite, MetadataRewriter, native_form,
};
use crate::tools::human_bytes;

/// Bytes to patch plus the density to write.
#[derive(Clone, PartialEq, Eq)]
pub struct DensityRequest {
    pub bytes: Vec<u8>,
    pub density: DensityPatch,
}

impl DensityRequest {
    pub fn new(bytes: Vec<u8>, density: DensityPatch) -> Self {
        Self { bytes, density }
    }
}

impl std::fmt::Debug for DensityRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DensityRequest")
            .field("bytes", &format_args!("[{} bytes]", self.bytes.len()))
            .field("density", &self.density)
            .finish()
    }
}

fn check_container(bytes: &[u8]) -> ToolResult<ContainerKind> {
    if bytes.is_empty() {
        return Err(ToolError::validation("bytes", "must not be empty", "0 bytes"));
    }
    ContainerKind::sniff(bytes).ok_or_else(|| {
        ToolError::validation("bytes", "not a JPEG or PNG file", format!("{} bytes", bytes.len()))
    })
}

/// Sets the density field of a JPEG or PNG without re-encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct DensityTool {
    rewriter: MetadataRewriter,
}

impl DensityTool {
    pub fn new(rewriter: MetadataRewriter) -> Self {
        Self { rewriter }
    }
}

#[async_trait]
impl ToolContract for DensityTool {
    type Input = DensityRequest;
    type Normalized = DensityRequest;
    type Output = DensityRewrite;
    type Options = ();

    fn name(&self) -> &str {
        "image-dpi-changer"
    }

    fn validate(&self, input: &DensityRequest) -> ToolResult<()> {
        check_container(&input.bytes)?;
        if input.density.x_density == 0 || input.density.y_density == 0 {
            return Err(ToolError::validation(
                "density",
                "must be greater than 0",
                input.density.to_string(),
            ));
        }
        Ok(())
    }

    fn normalize(&self, input: DensityRequest) -> DensityRequest {
        input
    }

    async fn process(&self, input: DensityRequest, _options: &()) -> ToolResult<DensityRewrite> {
        self.rewriter.set_density(&input.bytes, input.density)
    }

    fn verify(&self, output: &DensityRewrite) -> ToolResult<()> {
        if output.patched_bytes.is_empty() {
            return Err(ToolError::integrity("non-empty output", "patched buffer is empty"));
        }
        if output.patched_bytes.len() != output.original_len {
            return Err(ToolError::integrity(
                "length preserved",
                format!("{} bytes in, {} bytes out", output.original_len, output.patched_bytes.len()),
            ));
        }
        if !output.applied {
            return Ok(());
        }
        let stored = self.rewriter.read_density(&output.patched_bytes)?.density;
        let expected = native_form(output.container, output.requested)?;
        if stored != Some(expected) {
            return Err(ToolError::integrity(
                "density read-back",
                format!("expected {}, found {:?}", expected, stored),
            ));
        }
        Ok(())
    }

    fn explain(&self, output: &DensityRewrite) -> String {
        let size = human_bytes(output.patched_bytes.len() as u64);
        if output.applied {
            format!(
                "Set {} density to {} (was {}); {} unchanged in length, pixel data untouched",
                output.container,
                describe(&output.requested),
                describe(&output.original_density),
                size,
            )
        } else {
            format!(
                "{} carries no density field; reported default {}, file left unchanged ({})",
                output.container,
                describe(&output.original_density),
                size,
            )
        }
    }
}

/// Reads the density field, reporting the configured default when absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct DensityProbeTool {
    rewriter: MetadataRewriter,
}

impl DensityProbeTool {
    pub fn new(rewriter: MetadataRewriter) -> Self {
        Self { rewriter }
    }
}

#[async_trait]
impl ToolContract for DensityProbeTool {
    type Input = Vec<u8>;
    type Normalized = Vec<u8>;
    type Output = DensityReading;
    type Options = ();

    fn name(&self) -> &str {
        "image-dpi-checker"
    }

    fn validate(&self, input: &Vec<u8>) -> ToolResult<()> {
        check_container(input).map(|_| ())
    }

    fn normalize(&self, input: Vec<u8>) -> Vec<u8> {
        input
    }

    async fn process(&self, input: Vec<u8>, _options: &()) -> ToolResult<DensityReading> {
        self.rewriter.read_density(&input)
    }

    fn verify(&self, output: &DensityReading) -> ToolResult<()> {
        match output.density {
            Some(density) if density.x_density == 0 || density.y_density == 0 => {
                Err(ToolError::integrity(
                    "non-zero stored density",
                    format!("{} density field holds {}", output.container, density),
                ))
            }
            _ => Ok(()),
        }
    }

    fn explain(&self, output: &DensityReading) -> String {
        match output.density {
            Some(density) => format!("{} density is {}", output.container, describe(&density)),
            None => format!(
                "{} carries no density field; assuming {}",
                output.container,
                describe(&output.or_default(self.rewriter.default_dpi())),
            ),
        }
    }
}

/// `300 dpi`, or the stored unit followed by its DPI equivalent.
fn describe(density: &DensityPatch) -> String {
    match (density.unit, density.rounded_dpi()) {
        (crate::processing::DensityUnit::PerInch, _) | (_, None) => density.to_string(),
        (_, Some((x, y))) if x == y => format!("{} (~{} dpi)", density, x),
        (_, Some((x, y))) => format!("{} (~{}x{} dpi)", density, x, y),
    }
}

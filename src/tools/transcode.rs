//! Audio/video transcoding through the external transcoder boundary.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ToolError, ToolResult};
use crate::pipeline::ToolContract;
use crate::tools::human_bytes;
use crate::transcode::{ProgressFn, TranscodeInput, Transcoder, check_file_name};

/// Named inputs, a verbatim argument vector and the file to read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeRequest {
    pub inputs: Vec<TranscodeInput>,
    pub argv: Vec<String>,
    pub output_name: String,
}

/// Per-run knobs for [`TranscodeTool`].
#[derive(Clone, Default)]
pub struct TranscodeOptions {
    pub on_progress: Option<ProgressFn>,
}

impl std::fmt::Debug for TranscodeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeOptions")
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct TranscodeOutput {
    pub name: String,
    pub bytes: Vec<u8>,
    pub input_count: usize,
}

impl std::fmt::Debug for TranscodeOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeOutput")
            .field("name", &self.name)
            .field("bytes", &format_args!("[{} bytes]", self.bytes.len()))
            .field("input_count", &self.input_count)
            .finish()
    }
}

/// Hands a request to a [`Transcoder`] and checks that something came back.
#[derive(Clone)]
pub struct TranscodeTool {
    transcoder: Arc<dyn Transcoder>,
}

impl std::fmt::Debug for TranscodeTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeTool").finish_non_exhaustive()
    }
}

impl TranscodeTool {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }
}

#[async_trait]
impl ToolContract for TranscodeTool {
    type Input = TranscodeRequest;
    type Normalized = TranscodeRequest;
    type Output = TranscodeOutput;
    type Options = TranscodeOptions;

    fn name(&self) -> &str {
        "transcode-media"
    }

    fn validate(&self, input: &TranscodeRequest) -> ToolResult<()> {
        if input.inputs.is_empty() {
            return Err(ToolError::validation("inputs", "at least one input file is required", "[]"));
        }
        if input.argv.is_empty() {
            return Err(ToolError::validation("argv", "must not be empty", "[]"));
        }
        for file in &input.inputs {
            check_file_name("input name", &file.name)?;
        }
        check_file_name("output name", input.output_name.trim())
    }

    fn normalize(&self, mut input: TranscodeRequest) -> TranscodeRequest {
        input.output_name = input.output_name.trim().to_string();
        input
    }

    async fn process(
        &self,
        input: TranscodeRequest,
        options: &TranscodeOptions,
    ) -> ToolResult<TranscodeOutput> {
        let input_count = input.inputs.len();
        let bytes = self
            .transcoder
            .run_transcode(
                input.inputs,
                input.argv,
                &input.output_name,
                options.on_progress.clone(),
            )
            .await?;
        Ok(TranscodeOutput {
            name: input.output_name,
            bytes,
            input_count,
        })
    }

    fn verify(&self, output: &TranscodeOutput) -> ToolResult<()> {
        if output.bytes.is_empty() {
            return Err(ToolError::integrity(
                "non-empty output",
                format!("{} is empty", output.name),
            ));
        }
        Ok(())
    }

    fn explain(&self, output: &TranscodeOutput) -> String {
        let plural = if output.input_count == 1 { "" } else { "s" };
        format!(
            "Produced {} ({}) from {} input{}",
            output.name,
            human_bytes(output.bytes.len() as u64),
            output.input_count,
            plural,
        )
    }
}

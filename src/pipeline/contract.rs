//! # Tool Contract
//!
//! The boundary every tool implements to plug into [`PipelineRunner`].
//!
//! A contract bundles five stages. Their order is fixed by the runner:
//!
//! | Stage | Signature | May fail | May suspend |
//! |-------|-----------|----------|-------------|
//! | `validate` | `&Input -> ToolResult<()>` | yes | no |
//! | `normalize` | `Input -> Normalized` | no | no |
//! | `process` | `Normalized, &Options -> ToolResult<Output>` | yes | yes |
//! | `verify` | `&Output -> ToolResult<()>` | yes | no |
//! | `explain` | `&Output -> String` | no | no |
//!
//! `process` is the only stage allowed to be long-running or to fail in a
//! data-dependent way. `verify` rejects degenerate outputs (empty, structurally
//! inconsistent). `explain` derives its text purely from the output.
//!
//! Contracts are immutable values; one instance serves any number of runs.
//!
//! [`PipelineRunner`]: crate::pipeline::PipelineRunner

use async_trait::async_trait;

use crate::error::ToolResult;

/// Five-stage function bundle for one kind of tool.
#[async_trait]
pub trait ToolContract: Send + Sync {
    /// Raw caller input.
    type Input: Send;
    /// Canonical shape produced by `normalize`.
    type Normalized: Send;
    /// Result of `process`.
    type Output: Send;
    /// Per-run knobs passed to `process`.
    type Options: Default + Send + Sync;

    /// Stable, human-readable tool name used in logs.
    fn name(&self) -> &str;

    /// Reject malformed or missing input. Nothing else runs on failure.
    fn validate(&self, input: &Self::Input) -> ToolResult<()>;

    /// Bring validated input into canonical form. Infallible.
    fn normalize(&self, input: Self::Input) -> Self::Normalized;

    /// Perform the transformation. The pipeline's single suspension point.
    async fn process(
        &self,
        input: Self::Normalized,
        options: &Self::Options,
    ) -> ToolResult<Self::Output>;

    /// Reject degenerate or structurally inconsistent output.
    fn verify(&self, output: &Self::Output) -> ToolResult<()>;

    /// Deterministic human-readable summary of a verified output.
    fn explain(&self, output: &Self::Output) -> String;
}

//! # Pipeline Module
//!
//! The five-stage execution kernel every tool runs through:
//! validate → normalize → process → verify → explain.
//!
//! - [`contract`]: the `ToolContract` trait a tool implements
//! - [`runner`]: `PipelineRunner` and the `ExecutionResult` it returns
//! - [`batch`]: bounded, order-preserving batch execution
//! - [`cancel`]: cooperative cancellation checked between search probes

pub mod batch;
pub mod cancel;
pub mod contract;
pub mod runner;

pub use batch::{BatchSummary, run_batch};
pub use cancel::CancelToken;
pub use contract::ToolContract;
pub use runner::{ABORTED_STAGE, ExecutionResult, Outcome, PipelineRunner, PipelineStage};

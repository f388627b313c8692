//! # Toolbench
//!
//! The execution kernel and engines behind a catalog of small file tools.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `pipeline`: the five-stage `ToolContract`, `PipelineRunner`, batch execution, cancellation
//! - `processing`: size-targeted compression and density metadata rewriting
//! - `tools`: concrete tool strategies and the immutable `ToolRegistry`
//! - `transcode`: the boundary to an external ffmpeg-class transcoder
//! - `config`: configuration, defaults and validation
//! - `error`: the shared error taxonomy
//!
//! ## Features
//!
//! - **Uniform outcomes**: every run yields one `ExecutionResult`, success or a stage-qualified failure
//! - **Byte budgets**: highest-quality encoding that fits, resizing only when quality alone cannot
//! - **Metadata without re-encoding**: DPI patched in place in JPEG and PNG headers
//! - **Async/await**: CPU-bound work runs on Tokio's blocking pool
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use toolbench::config::ToolbenchConfig;
//! use toolbench::pipeline::PipelineRunner;
//! use toolbench::processing::{CompressionRequest, ImageCodec};
//! use toolbench::tools::{CompressOptions, ToolRegistry, ToolRequest};
//! use toolbench::transcode::FfmpegTranscoder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ToolRegistry::standard(
//!     &ToolbenchConfig::default(),
//!     Arc::new(ImageCodec::new()),
//!     Arc::new(FfmpegTranscoder::default()),
//! )?;
//!
//! let source = std::fs::read("photo.jpg")?;
//! let request = ToolRequest::Compress {
//!     request: CompressionRequest::new(source, 0),
//!     options: CompressOptions::default(),
//! };
//! let result = registry
//!     .dispatch(&PipelineRunner::new(), "compress-image-to-50kb", request)
//!     .await;
//! println!("{}", result.explanation().unwrap_or("failed"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod processing;
pub mod tools;
pub mod transcode;

/// Re-export error types for convenience
pub use error::{
    ErrorKind, HasRecoverySuggestion, HasSeverity, Recoverable, Retryable, ToolError, ToolResult,
};

pub use pipeline::{ExecutionResult, PipelineRunner, ToolContract};
pub use tools::{ToolRegistry, ToolRequest, ToolResponse};

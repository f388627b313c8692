//! # Error Handling
//!
//! This module provides the error type shared by every stage of the tool pipeline
//! and by the transformation engines it drives.
//!
//! ## Architecture
//!
//! - **Error Types**: One enum, `ToolError`, with a variant per failure family and rich context
//! - **Error Kinds**: `ErrorKind` folds variants onto the four-way taxonomy callers act on
//! - **Error Traits**: Classification traits for retry and recovery decisions
//! - **Error Context**: Timestamps, operation context, recovery suggestions and metadata
//!
//! ## Error Kinds
//!
//! - `Validation`: malformed or missing input, reported before any work is done
//! - `Processing`: the transformation itself failed (decode failure, bad container)
//! - `Integrity`: the verify stage rejected the produced output
//! - `Infeasibility`: a constraint cannot be met even at floor settings; relax it
//!   instead of retrying
//!
//! Nothing in this crate retries on its own. `Retryable` and `Recoverable` only
//! describe what a caller could do next.
//!
//! ## Usage
//!
//! ```rust
//! use toolbench::error::{ErrorKind, ToolError, Retryable};
//!
//! let error = ToolError::infeasible(2048, 3180)
//!     .with_context("compressing upload.jpg")
//!     .with_recovery_suggestion("Raise the byte budget or allow a different format");
//!
//! assert_eq!(error.kind(), ErrorKind::Infeasibility);
//! assert!(!error.is_retryable());
//! ```

use std::{error::Error as StdError, fmt, time::SystemTime};

/// Severity levels for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational errors
    Info,
    /// Warnings that may indicate potential issues
    Warning,
    /// Errors that affect the current operation only
    Error,
    /// Errors that require immediate attention
    Critical,
}

/// The failure taxonomy surfaced to pipeline callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Processing,
    Integrity,
    Infeasibility,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Processing => "processing",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Infeasibility => "infeasibility",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error context containing metadata about when and where an error occurred
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// When the error occurred
    pub timestamp: SystemTime,
    /// The operation being performed when the error occurred
    pub operation: Option<String>,
    /// Additional context about the error
    pub context: Option<String>,
    /// Suggested recovery action
    pub recovery_suggestion: Option<String>,
    /// Error severity level
    pub severity: ErrorSeverity,
    /// Whether this error is retryable
    pub retryable: bool,
    /// Additional metadata as key-value pairs
    pub metadata: std::collections::BTreeMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation: None,
            context: None,
            recovery_suggestion: None,
            severity: ErrorSeverity::Error,
            retryable: false,
            metadata: std::collections::BTreeMap::new(),
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new() -> Self {
        Self::default()
    }
}

/// Base error type for toolbench
#[derive(Debug)]
pub enum ToolError {
    /// Input rejected before processing
    Validation {
        field: String,
        constraint: String,
        value: String,
        context: ErrorContext,
    },
    /// Transformation failures
    Processing {
        operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// Output rejected by a verify stage
    Integrity {
        check: String,
        reason: String,
        context: ErrorContext,
    },
    /// A byte budget that no allowed setting can meet
    Infeasible {
        target_bytes: u64,
        achieved_bytes: u64,
        context: ErrorContext,
    },
    /// Unrecognized or malformed binary container
    Container {
        format: String,
        offset: Option<usize>,
        reason: String,
        context: ErrorContext,
    },
    /// Work stopped by a cancellation signal
    Cancelled {
        operation: String,
        context: ErrorContext,
    },
    /// I/O errors
    Io {
        operation: String,
        path: Option<String>,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// External library errors
    External {
        library: String,
        source: Box<dyn StdError + Send + Sync>,
        context: ErrorContext,
    },
}

impl ToolError {
    /// Create a validation error
    pub fn validation(
        field: impl Into<String>,
        constraint: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            constraint: constraint.into(),
            value: value.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a processing error
    pub fn processing(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Processing {
            operation: operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create an integrity error
    pub fn integrity(check: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Integrity {
            check: check.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create an infeasibility error
    pub fn infeasible(target_bytes: u64, achieved_bytes: u64) -> Self {
        Self::Infeasible {
            target_bytes,
            achieved_bytes,
            context: ErrorContext::new(),
        }
    }

    /// Create a container error
    pub fn container(
        format: impl Into<String>,
        offset: Option<usize>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Container {
            format: format.into(),
            offset,
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: None,
            source,
            context: ErrorContext::new(),
        }
    }

    /// Create an external library error
    pub fn external(
        library: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            library: library.into(),
            source: Box::new(source),
            context: ErrorContext::new(),
        }
    }

    /// Attach the path an I/O error refers to
    pub fn with_path(mut self, value: impl Into<String>) -> Self {
        if let Self::Io { path, .. } = &mut self {
            *path = Some(value.into());
        }
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_mut().context = Some(context.into());
        self
    }

    /// Add operation context
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    /// Add recovery suggestion
    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context_mut().recovery_suggestion = Some(suggestion.into());
        self
    }

    /// Set severity
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.context_mut().severity = severity;
        self
    }

    /// Mark as retryable
    pub fn retryable(mut self) -> Self {
        self.context_mut().retryable = true;
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context_mut().metadata.insert(key.into(), value.into());
        self
    }

    /// Get the error context
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Validation { context, .. } => context,
            Self::Processing { context, .. } => context,
            Self::Integrity { context, .. } => context,
            Self::Infeasible { context, .. } => context,
            Self::Container { context, .. } => context,
            Self::Cancelled { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::External { context, .. } => context,
        }
    }

    /// Get mutable reference to error context
    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Validation { context, .. } => context,
            Self::Processing { context, .. } => context,
            Self::Integrity { context, .. } => context,
            Self::Infeasible { context, .. } => context,
            Self::Container { context, .. } => context,
            Self::Cancelled { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::External { context, .. } => context,
        }
    }

    /// Fold the variant onto the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::Infeasible { .. } => ErrorKind::Infeasibility,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Processing { .. }
            | Self::Container { .. }
            | Self::Io { .. }
            | Self::External { .. } => ErrorKind::Processing,
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Processing { .. } => "processing",
            Self::Integrity { .. } => "integrity",
            Self::Infeasible { .. } => "infeasible",
            Self::Container { .. } => "container",
            Self::Cancelled { .. } => "cancelled",
            Self::Io { .. } => "io",
            Self::External { .. } => "external",
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::Validation {
                field,
                constraint,
                value,
                ..
            } => {
                write!(
                    f,
                    "Validation failed for '{}': {} (value: {})",
                    field, constraint, value
                )
            }
            ToolError::Processing {
                operation, reason, ..
            } => {
                write!(f, "Processing failed during {}: {}", operation, reason)
            }
            ToolError::Integrity { check, reason, .. } => {
                write!(f, "Integrity check '{}' failed: {}", check, reason)
            }
            ToolError::Infeasible {
                target_bytes,
                achieved_bytes,
                ..
            } => {
                write!(
                    f,
                    "Target of {} bytes is unreachable; smallest achievable output is {} bytes",
                    target_bytes, achieved_bytes
                )
            }
            ToolError::Container {
                format,
                offset,
                reason,
                ..
            } => {
                if let Some(offset) = offset {
                    write!(f, "{} container error at byte {}: {}", format, offset, reason)
                } else {
                    write!(f, "{} container error: {}", format, reason)
                }
            }
            ToolError::Cancelled { operation, .. } => {
                write!(f, "Cancelled during {}", operation)
            }
            ToolError::Io {
                operation,
                path,
                source,
                ..
            } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "I/O error during {} on '{}': {}",
                        operation, path, source
                    )
                } else {
                    write!(f, "I/O error during {}: {}", operation, source)
                }
            }
            ToolError::External {
                library, source, ..
            } => {
                write!(f, "External library error in {}: {}", library, source)
            }
        }
    }
}

impl StdError for ToolError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::External { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type alias using our custom error type
pub type ToolResult<T> = Result<T, ToolError>;

/// Trait for errors that can be retried
pub trait Retryable {
    /// Check if this error can be retried
    fn is_retryable(&self) -> bool;

    /// Get the recommended retry delay in milliseconds
    fn retry_delay_ms(&self) -> Option<u64> {
        None
    }
}

impl Retryable for ToolError {
    fn is_retryable(&self) -> bool {
        self.context().retryable || matches!(self, Self::Io { .. } | Self::Cancelled { .. })
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            Self::Io { .. } => Some(100),
            _ => None,
        }
    }
}

/// Recovery strategies a caller can apply after a failure
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStrategy {
    /// Run the same request again
    Retry { max_attempts: usize, delay_ms: u64 },
    /// Loosen the constraint that could not be met
    RelaxConstraint { description: String },
    /// Correct the input and resubmit
    FixInput { field: String },
    /// Skip the current item and continue with its siblings
    Skip { reason: String },
}

/// Trait for errors that can be recovered from
pub trait Recoverable {
    /// Check if this error can be recovered from
    fn is_recoverable(&self) -> bool;

    /// Get recovery strategies for this error
    fn recovery_strategies(&self) -> Vec<RecoveryStrategy>;
}

impl Recoverable for ToolError {
    fn is_recoverable(&self) -> bool {
        !self.recovery_strategies().is_empty()
    }

    fn recovery_strategies(&self) -> Vec<RecoveryStrategy> {
        match self {
            Self::Validation { field, .. } => vec![RecoveryStrategy::FixInput {
                field: field.clone(),
            }],
            Self::Infeasible { target_bytes, achieved_bytes, .. } => vec![
                RecoveryStrategy::RelaxConstraint {
                    description: format!(
                        "raise the budget from {} to at least {} bytes",
                        target_bytes, achieved_bytes
                    ),
                },
                RecoveryStrategy::RelaxConstraint {
                    description: "allow resizing or choose a more compact format".to_string(),
                },
            ],
            Self::Io { .. } => vec![RecoveryStrategy::Retry {
                max_attempts: 3,
                delay_ms: 100,
            }],
            Self::Cancelled { .. } => vec![RecoveryStrategy::Retry {
                max_attempts: 1,
                delay_ms: 0,
            }],
            Self::Processing { .. } | Self::Container { .. } | Self::External { .. } => {
                vec![RecoveryStrategy::Skip {
                    reason: "input cannot be transformed".to_string(),
                }]
            }
            Self::Integrity { .. } => vec![],
        }
    }
}

/// Trait for errors with severity levels
pub trait HasSeverity {
    /// Get the severity level of this error
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for ToolError {
    fn severity(&self) -> ErrorSeverity {
        self.context().severity
    }
}

/// Trait for errors that provide recovery suggestions
pub trait HasRecoverySuggestion {
    /// Get recovery suggestion for this error
    fn recovery_suggestion(&self) -> Option<&str>;
}

impl HasRecoverySuggestion for ToolError {
    fn recovery_suggestion(&self) -> Option<&str> {
        self.context().recovery_suggestion.as_deref()
    }
}

/// Error classification utilities
pub mod classify {
    use super::*;

    /// Caller input is at fault; resubmitting unchanged cannot succeed
    pub fn is_input_error(error: &ToolError) -> bool {
        matches!(error.kind(), ErrorKind::Validation)
    }

    /// A stated constraint must be relaxed before retrying makes sense
    pub fn needs_relaxed_constraint(error: &ToolError) -> bool {
        matches!(error.kind(), ErrorKind::Infeasibility)
    }

    /// Check if an error requires user intervention
    pub fn requires_user_intervention(error: &ToolError) -> bool {
        error.severity() >= ErrorSeverity::Critical
            || is_input_error(error)
            || needs_relaxed_constraint(error)
    }
}

/// Error conversion implementations
impl From<std::io::Error> for ToolError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}

impl From<image::ImageError> for ToolError {
    fn from(error: image::ImageError) -> Self {
        Self::external("image", error)
    }
}

impl From<tb_scale::cpu::ScaleError> for ToolError {
    fn from(error: tb_scale::cpu::ScaleError) -> Self {
        Self::processing("resample", error.to_string())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(error: serde_json::Error) -> Self {
        Self::external("serde_json", error)
    }
}

impl From<tokio::task::JoinError> for ToolError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::processing("worker task", error.to_string())
    }
}

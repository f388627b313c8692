//! Cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ToolError, ToolResult};

/// Shared flag a caller flips to stop long-running work between iterations.
///
/// Clones observe the same flag. Nothing is interrupted mid-encode; engines poll
/// [`CancelToken::check`] before each unit of work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `ToolError::Cancelled` once the flag is set.
    pub fn check(&self, operation: &str) -> ToolResult<()> {
        if self.is_cancelled() {
            return Err(ToolError::cancelled(operation));
        }
        Ok(())
    }
}

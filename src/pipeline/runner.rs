//! # Pipeline Runner
//!
//! Drives one [`ToolContract`] against one input and folds every exit path into a
//! single [`ExecutionResult`].
//!
//! ## Guarantees
//!
//! - Stages run in the fixed order validate → normalize → process → verify → explain
//! - A failed stage stops the run; no later stage is invoked
//! - Errors and panics raised by any stage are caught and reported, never propagated
//! - Every exit path records elapsed time from a monotonic clock
//! - Nothing is retried; retry policy belongs to the caller

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures_util::FutureExt;
use tracing::{debug, warn};

use crate::error::{ErrorKind, ToolError};
use crate::pipeline::contract::ToolContract;

/// Stage label carried by every failure outcome.
pub const ABORTED_STAGE: &str = "Execution Aborted";

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStage {
    Validate,
    Normalize,
    Process,
    Verify,
    Explain,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Validate => "validate",
            PipelineStage::Normalize => "normalize",
            PipelineStage::Process => "process",
            PipelineStage::Verify => "verify",
            PipelineStage::Explain => "explain",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Either a verified output with its explanation, or an error with the stage that raised it.
#[derive(Debug)]
pub enum Outcome<T> {
    Success { data: T, explanation: String },
    Failure { error: ToolError, failed_at: PipelineStage },
}

/// Result of one pipeline run. Created fresh per invocation and owned by the caller.
#[derive(Debug)]
pub struct ExecutionResult<T> {
    /// Wall time from entry to the exit path taken, in milliseconds.
    pub timing_ms: f64,
    pub outcome: Outcome<T>,
}

impl<T> ExecutionResult<T> {
    pub(crate) fn succeeded(started: Instant, data: T, explanation: String) -> Self {
        Self {
            timing_ms: elapsed_ms(started),
            outcome: Outcome::Success { data, explanation },
        }
    }

    pub(crate) fn failed(started: Instant, error: ToolError, failed_at: PipelineStage) -> Self {
        Self {
            timing_ms: elapsed_ms(started),
            outcome: Outcome::Failure { error, failed_at },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match &self.outcome {
            Outcome::Success { data, .. } => Some(data),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn explanation(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { explanation, .. } => Some(explanation),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ToolError> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { error, .. } => Some(error),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error().map(ToolError::kind)
    }

    /// `ABORTED_STAGE` on failure, `None` on success.
    pub fn stage(&self) -> Option<&'static str> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { .. } => Some(ABORTED_STAGE),
        }
    }

    /// The stage whose failure ended the run.
    pub fn failed_at(&self) -> Option<PipelineStage> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { failed_at, .. } => Some(*failed_at),
        }
    }

    /// Stage-qualified failure message, e.g. `Execution Aborted (validate): ...`.
    pub fn failure_message(&self) -> Option<String> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { error, failed_at } => {
                Some(format!("{} ({}): {}", ABORTED_STAGE, failed_at, error))
            }
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self.outcome {
            Outcome::Success { data, .. } => Some(data),
            Outcome::Failure { .. } => None,
        }
    }

    /// Convert into a plain `Result`, keeping the explanation on success.
    pub fn into_result(self) -> Result<(T, String), ToolError> {
        match self.outcome {
            Outcome::Success { data, explanation } => Ok((data, explanation)),
            Outcome::Failure { error, .. } => Err(error),
        }
    }

    /// Map the success payload, keeping timing and failure details.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ExecutionResult<U> {
        let outcome = match self.outcome {
            Outcome::Success { data, explanation } => Outcome::Success {
                data: f(data),
                explanation,
            },
            Outcome::Failure { error, failed_at } => Outcome::Failure { error, failed_at },
        };
        ExecutionResult {
            timing_ms: self.timing_ms,
            outcome,
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "stage panicked".to_string()
    }
}

/// Orchestrates a [`ToolContract`] against one input.
///
/// The runner holds no state between calls; a single instance can be shared
/// across tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineRunner;

impl PipelineRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `contract` against `input`. `options` falls back to `C::Options::default()`.
    pub async fn run<C>(
        &self,
        contract: &C,
        input: C::Input,
        options: Option<C::Options>,
    ) -> ExecutionResult<C::Output>
    where
        C: ToolContract + ?Sized,
    {
        let started = Instant::now();
        let tool = contract.name();

        if let Err(error) = guarded(tool, PipelineStage::Validate, || contract.validate(&input))
            .and_then(|checked| checked)
        {
            debug!(tool, %error, "validation rejected input");
            return ExecutionResult::failed(started, error, PipelineStage::Validate);
        }

        let normalized = match guarded(tool, PipelineStage::Normalize, || contract.normalize(input)) {
            Ok(normalized) => normalized,
            Err(error) => return ExecutionResult::failed(started, error, PipelineStage::Normalize),
        };
        let options = options.unwrap_or_default();

        let processed = AssertUnwindSafe(contract.process(normalized, &options))
            .catch_unwind()
            .await;
        let output = match processed {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => {
                debug!(tool, %error, "process stage failed");
                return ExecutionResult::failed(started, error, PipelineStage::Process);
            }
            Err(payload) => {
                let error = panicked(tool, PipelineStage::Process, payload.as_ref());
                return ExecutionResult::failed(started, error, PipelineStage::Process);
            }
        };

        if let Err(error) = guarded(tool, PipelineStage::Verify, || contract.verify(&output))
            .and_then(|checked| checked)
        {
            debug!(tool, %error, "verification rejected output");
            return ExecutionResult::failed(started, error, PipelineStage::Verify);
        }

        let mut explanation = match guarded(tool, PipelineStage::Explain, || contract.explain(&output)) {
            Ok(explanation) => explanation,
            Err(error) => return ExecutionResult::failed(started, error, PipelineStage::Explain),
        };
        if explanation.trim().is_empty() {
            explanation = format!("{} completed", tool);
        }

        let result = ExecutionResult::succeeded(started, output, explanation);
        debug!(tool, timing_ms = result.timing_ms, "pipeline completed");
        result
    }
}

/// Run a synchronous stage, turning a panic into a processing error.
fn guarded<R>(tool: &str, stage: PipelineStage, f: impl FnOnce() -> R) -> Result<R, ToolError> {
    std::panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| panicked(tool, stage, payload.as_ref()))
}

fn panicked(tool: &str, stage: PipelineStage, payload: &(dyn Any + Send)) -> ToolError {
    let reason = panic_message(payload);
    warn!(tool, %stage, reason = %reason, "stage panicked");
    ToolError::processing(tool.to_string(), reason).with_operation(stage.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the stages it passes through; behaviour keyed off the input text.
    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<PipelineStage>>,
    }

    impl Recorder {
        fn log(&self, stage: PipelineStage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn stages(&self) -> Vec<PipelineStage> {
            self.stages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolContract for Recorder {
        type Input = String;
        type Normalized = String;
        type Output = String;
        type Options = usize;

        fn name(&self) -> &str {
            "recorder"
        }

        fn validate(&self, input: &String) -> ToolResult<()> {
            self.log(PipelineStage::Validate);
            if input == "panic in validate" {
                panic!("validate blew up");
            }
            if input.is_empty() {
                return Err(ToolError::validation("input", "must not be empty", ""));
            }
            Ok(())
        }

        fn normalize(&self, input: String) -> String {
            self.log(PipelineStage::Normalize);
            if input == "panic in normalize" {
                panic!("normalize blew up");
            }
            input.trim().to_lowercase()
        }

        async fn process(&self, input: String, repeat: &usize) -> ToolResult<String> {
            self.log(PipelineStage::Process);
            match input.as_str() {
                "fail" => Err(ToolError::processing("recorder", "asked to fail")),
                "panic" => panic!("asked to panic"),
                "empty" => Ok(String::new()),
                _ => Ok(input.repeat((*repeat).max(1))),
            }
        }

        fn verify(&self, output: &String) -> ToolResult<()> {
            self.log(PipelineStage::Verify);
            if output == "panic in verify" {
                panic!("verify blew up");
            }
            if output.is_empty() {
                return Err(ToolError::integrity("non-empty", "output is empty"));
            }
            Ok(())
        }

        fn explain(&self, output: &String) -> String {
            self.log(PipelineStage::Explain);
            if output == "panic in explain" {
                panic!("explain blew up");
            }
            format!("{} chars", output.len())
        }
    }

    #[tokio::test]
    async fn test_success_runs_every_stage_in_order() {
        let tool = Recorder::default();
        let result = PipelineRunner::new().run(&tool, "  AB ".to_string(), Some(2)).await;

        assert!(result.is_success());
        assert_eq!(result.data().map(String::as_str), Some("abab"));
        assert_eq!(result.explanation(), Some("4 chars"));
        assert!(result.error().is_none());
        assert!(result.stage().is_none());
        assert!(result.timing_ms >= 0.0);
        assert_eq!(
            tool.stages(),
            vec![
                PipelineStage::Validate,
                PipelineStage::Normalize,
                PipelineStage::Process,
                PipelineStage::Verify,
                PipelineStage::Explain,
            ]
        );
    }

    #[tokio::test]
    async fn test_validation_failure_stops_immediately() {
        let tool = Recorder::default();
        let result = PipelineRunner::new().run(&tool, String::new(), None).await;

        assert!(!result.is_success());
        assert_eq!(result.stage(), Some(ABORTED_STAGE));
        assert_eq!(result.failed_at(), Some(PipelineStage::Validate));
        assert_eq!(result.error_kind(), Some(ErrorKind::Validation));
        assert!(result.data().is_none());
        assert!(result.explanation().is_none());
        assert_eq!(tool.stages(), vec![PipelineStage::Validate]);
    }

    #[tokio::test]
    async fn test_process_error_is_captured() {
        let tool = Recorder::default();
        let result = PipelineRunner::new().run(&tool, "FAIL".to_string(), None).await;

        assert_eq!(result.failed_at(), Some(PipelineStage::Process));
        assert_eq!(result.stage(), Some(ABORTED_STAGE));
        assert!(!tool.stages().contains(&PipelineStage::Verify));
        assert_eq!(
            result.failure_message().unwrap(),
            "Execution Aborted (process): Processing failed during recorder: asked to fail"
        );
    }

    #[tokio::test]
    async fn test_process_panic_is_captured() {
        let tool = Recorder::default();
        let result = PipelineRunner::new().run(&tool, "panic".to_string(), None).await;

        assert_eq!(result.failed_at(), Some(PipelineStage::Process));
        assert_eq!(result.error_kind(), Some(ErrorKind::Processing));
        assert!(result.error().unwrap().to_string().contains("asked to panic"));
    }

    #[tokio::test]
    async fn test_panics_in_any_stage_are_captured() {
        let cases = [
            ("panic in validate", PipelineStage::Validate),
            ("panic in normalize", PipelineStage::Normalize),
            ("panic in verify", PipelineStage::Verify),
            ("panic in explain", PipelineStage::Explain),
        ];
        for (input, stage) in cases {
            let tool = Recorder::default();
            let result = PipelineRunner::new().run(&tool, input.to_string(), None).await;

            assert_eq!(result.failed_at(), Some(stage), "{}", input);
            assert_eq!(result.error_kind(), Some(ErrorKind::Processing));
            assert!(result.error().unwrap().to_string().contains("blew up"));
            assert_eq!(tool.stages().last(), Some(&stage));
        }
    }

    #[tokio::test]
    async fn test_verification_failure() {
        let tool = Recorder::default();
        let result = PipelineRunner::new().run(&tool, "empty".to_string(), None).await;

        assert_eq!(result.failed_at(), Some(PipelineStage::Verify));
        assert_eq!(result.error_kind(), Some(ErrorKind::Integrity));
        assert!(!tool.stages().contains(&PipelineStage::Explain));
    }

    #[tokio::test]
    async fn test_map_keeps_explanation_and_timing() {
        let tool = Recorder::default();
        let result = PipelineRunner::new().run(&tool, "xy".to_string(), None).await;
        let timing = result.timing_ms;

        let mapped = result.map(|s| s.len());
        assert_eq!(mapped.data(), Some(&2));
        assert_eq!(mapped.explanation(), Some("2 chars"));
        assert_eq!(mapped.timing_ms, timing);
    }
}

//! Bounded, order-preserving batch execution.
//!
//! Each item runs through its own [`PipelineRunner::run`], so a failing (or
//! panicking) item resolves to a failure result without touching its siblings.

use std::time::Instant;

use futures_util::stream::{self, StreamExt};
use tracing::info;

use crate::error::ErrorKind;
use crate::pipeline::contract::ToolContract;
use crate::pipeline::runner::{ExecutionResult, PipelineRunner};

/// Aggregate counts over one batch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Failures caused by an unreachable constraint; a subset of `failed`.
    pub infeasible: usize,
    pub total_ms: f64,
}

impl BatchSummary {
    pub fn from_results<T>(results: &[ExecutionResult<T>], total_ms: f64) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let infeasible = results
            .iter()
            .filter(|r| r.error_kind() == Some(ErrorKind::Infeasibility))
            .count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            infeasible,
            total_ms,
        }
    }
}

/// Run `contract` over `inputs` with at most `concurrency` items in flight.
///
/// Results come back in input order. A `concurrency` of 0 is treated as 1.
pub async fn run_batch<C>(
    runner: &PipelineRunner,
    contract: &C,
    inputs: Vec<C::Input>,
    options: C::Options,
    concurrency: usize,
) -> (Vec<ExecutionResult<C::Output>>, BatchSummary)
where
    C: ToolContract + ?Sized,
    C::Options: Clone,
{
    let started = Instant::now();
    let limit = concurrency.max(1);

    let results: Vec<_> = stream::iter(inputs)
        .map(|input| runner.run(contract, input, Some(options.clone())))
        .buffered(limit)
        .collect()
        .await;

    let summary = BatchSummary::from_results(&results, started.elapsed().as_secs_f64() * 1000.0);
    info!(
        tool = contract.name(),
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        concurrency = limit,
        "batch finished"
    );
    (results, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ToolError, ToolResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sleeps for `input` ms and tracks the peak number of concurrent calls.
    #[derive(Default)]
    struct Sleeper {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ToolContract for Sleeper {
        type Input = u64;
        type Normalized = u64;
        type Output = u64;
        type Options = ();

        fn name(&self) -> &str {
            "sleeper"
        }

        fn validate(&self, _input: &u64) -> ToolResult<()> {
            Ok(())
        }

        fn normalize(&self, input: u64) -> u64 {
            input
        }

        async fn process(&self, input: u64, _options: &()) -> ToolResult<u64> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(input % 100)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if input >= 100 {
                return Err(ToolError::infeasible(input, input + 1));
            }
            Ok(input)
        }

        fn verify(&self, _output: &u64) -> ToolResult<()> {
            Ok(())
        }

        fn explain(&self, output: &u64) -> String {
            format!("slept {output}ms")
        }
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_caps_concurrency() {
        let tool = Sleeper::default();
        let inputs = vec![30, 5, 120, 10, 25, 1, 15];

        let (results, summary) = run_batch(&PipelineRunner::new(), &tool, inputs, (), 3).await;

        assert_eq!(results.len(), 7);
        assert_eq!(results[0].data(), Some(&30));
        assert_eq!(results[1].data(), Some(&5));
        assert!(!results[2].is_success());
        assert_eq!(results[6].data(), Some(&15));
        assert!(tool.peak.load(Ordering::SeqCst) <= 3);

        assert_eq!(summary.total, 7);
        assert_eq!(summary.succeeded, 6);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.infeasible, 1);
    }

    #[tokio::test]
    async fn test_zero_concurrency_runs_serially() {
        let tool = Sleeper::default();
        let (results, _) = run_batch(&PipelineRunner::new(), &tool, vec![2, 2, 2], (), 0).await;
        assert!(results.iter().all(|r| r.is_success()));
        assert_eq!(tool.peak.load(Ordering::SeqCst), 1);
    }
}

//! Execution strategy engine.
//!
//! Drives a scheduled task set under one of four concurrency strategies.
//! Every task call is admitted by the provider's token bucket, wrapped in
//! the health monitor's retry loop, optionally raced against a per-task
//! timeout, and captured into a [`SearchOutcome`] — task failures never
//! abort the batch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Instant};

use crate::models::{Record, SearchQuery, SearchResponse};
use crate::orchestrator::health::HealthMonitor;
use crate::orchestrator::scheduler::SearchTask;
use crate::providers::ProviderError;
use crate::utils::RateLimiterPool;

/// Concurrency strategy for a search run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    /// Dispatch every task at once and wait for all to settle
    FullParallel,
    /// Run fixed-size groups concurrently, groups one after another
    BatchParallel,
    /// Bounded in-flight window sized by the scheduler
    SmartParallel,
    /// One task at a time in priority order (debugging/determinism)
    Sequential,
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        ExecutionStrategy::FullParallel
    }
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExecutionStrategy::FullParallel => "full-parallel",
            ExecutionStrategy::BatchParallel => "batch-parallel",
            ExecutionStrategy::SmartParallel => "smart-parallel",
            ExecutionStrategy::Sequential => "sequential",
        };
        write!(f, "{}", name)
    }
}

/// Configuration for one parallel search run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelSearchConfig {
    /// Concurrency strategy
    #[serde(default)]
    pub strategy: ExecutionStrategy,

    /// Upper bound on concurrent tasks
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Group size for the batch-parallel strategy
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-task timeout in milliseconds (0 disables the timeout)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Whether merged results are deduplicated
    #[serde(default = "default_true")]
    pub enable_deduplication: bool,

    /// Whether run metrics are computed
    #[serde(default = "default_true")]
    pub enable_performance_monitoring: bool,
}

fn default_max_concurrency() -> usize {
    5
}

fn default_batch_size() -> usize {
    3
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl Default for ParallelSearchConfig {
    fn default() -> Self {
        Self {
            strategy: ExecutionStrategy::default(),
            max_concurrency: default_max_concurrency(),
            batch_size: default_batch_size(),
            timeout_ms: default_timeout_ms(),
            enable_deduplication: true,
            enable_performance_monitoring: true,
        }
    }
}

impl ParallelSearchConfig {
    /// Per-task timeout, if enabled
    pub fn task_timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Captured outcome of one provider task
#[derive(Debug)]
pub struct SearchOutcome {
    /// Provider that was called
    pub provider_id: String,

    /// The provider's response, or the error that ended the task
    pub result: Result<SearchResponse, ProviderError>,

    /// Observed task latency, including rate-limit waits and retries
    pub latency: Duration,

    /// When the task settled
    pub timestamp: DateTime<Utc>,
}

impl SearchOutcome {
    /// Build a successful outcome
    pub fn success(
        provider_id: impl Into<String>,
        response: SearchResponse,
        latency: Duration,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            result: Ok(response),
            latency,
            timestamp: Utc::now(),
        }
    }

    /// Build a failed outcome
    pub fn failure(
        provider_id: impl Into<String>,
        error: ProviderError,
        latency: Duration,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            result: Err(error),
            latency,
            timestamp: Utc::now(),
        }
    }

    /// Whether the task produced a response
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Records carried by this outcome (empty on failure)
    pub fn records(&self) -> &[Record] {
        match &self.result {
            Ok(response) => &response.records,
            Err(_) => &[],
        }
    }

    /// The task's error, if it failed
    pub fn error(&self) -> Option<&ProviderError> {
        self.result.as_ref().err()
    }
}

/// Run one scheduled task through the full per-task pipeline.
///
/// Never fails: every path settles into a [`SearchOutcome`].
async fn run_task(
    task: &SearchTask,
    query: &SearchQuery,
    config: &ParallelSearchConfig,
    health: &HealthMonitor,
    limiters: &RateLimiterPool,
) -> SearchOutcome {
    let provider_id = task.provider.id().to_string();
    let started = Instant::now();

    limiters.acquire(&provider_id).await;

    let call = {
        let provider = Arc::clone(&task.provider);
        let query = query.clone();
        health.execute_with_retry(&provider_id, move || {
            let provider = Arc::clone(&provider);
            let query = query.clone();
            async move { provider.search(&query).await }
        })
    };

    let result = match config.task_timeout() {
        Some(limit) => match timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                // The underlying call is dropped here; the health record
                // still has to reflect the timed-out attempt.
                health.record_failure(&provider_id, &ProviderError::Timeout);
                Err(ProviderError::Timeout)
            }
        },
        None => call.await,
    };

    if let Err(error) = &result {
        tracing::warn!("Search failed for {}: {}", provider_id, error);
    }

    SearchOutcome {
        provider_id,
        result,
        latency: started.elapsed(),
        timestamp: Utc::now(),
    }
}

/// Execute a task set under the configured strategy.
///
/// full-parallel and batch-parallel preserve task order in the output;
/// smart-parallel yields outcomes in completion order; sequential runs the
/// priority order one task at a time. `window` is the bounded in-flight
/// size used by smart-parallel.
pub(crate) async fn execute_tasks(
    tasks: &[SearchTask],
    query: &SearchQuery,
    config: &ParallelSearchConfig,
    window: usize,
    health: &HealthMonitor,
    limiters: &RateLimiterPool,
) -> Vec<SearchOutcome> {
    match config.strategy {
        ExecutionStrategy::FullParallel => {
            join_all(
                tasks
                    .iter()
                    .map(|task| run_task(task, query, config, health, limiters)),
            )
            .await
        }
        ExecutionStrategy::BatchParallel => {
            let mut outcomes = Vec::with_capacity(tasks.len());
            for batch in tasks.chunks(config.batch_size.max(1)) {
                let settled = join_all(
                    batch
                        .iter()
                        .map(|task| run_task(task, query, config, health, limiters)),
                )
                .await;
                outcomes.extend(settled);
            }
            outcomes
        }
        ExecutionStrategy::SmartParallel => {
            // Every in-flight task is its own future inside the stream, so
            // completion is tracked per future — never by comparing values.
            stream::iter(
                tasks
                    .iter()
                    .map(|task| run_task(task, query, config, health, limiters)),
            )
            .buffer_unordered(window.max(1))
            .collect()
            .await
        }
        ExecutionStrategy::Sequential => {
            let mut outcomes = Vec::with_capacity(tasks.len());
            for task in tasks {
                outcomes.push(run_task(task, query, config, health, limiters).await);
            }
            outcomes
        }
    }
}

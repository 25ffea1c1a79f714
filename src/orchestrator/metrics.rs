//! Run-level performance metrics.

use std::time::Duration;

use serde::Serialize;

use crate::orchestrator::executor::SearchOutcome;
use crate::utils::MergedResults;

/// Per-provider row in the run metrics
#[derive(Debug, Clone, Serialize)]
pub struct ProviderMetrics {
    /// Provider identifier
    pub provider_id: String,

    /// Observed task latency in milliseconds
    pub latency_ms: u64,

    /// Whether the task produced a response
    pub success: bool,

    /// Number of records returned
    pub record_count: usize,

    /// Error message for failed tasks
    pub error: Option<String>,
}

/// Aggregated metrics for one parallel search run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParallelSearchMetrics {
    /// Wall-clock duration of the whole run in milliseconds
    pub total_duration_ms: u64,

    /// Number of providers queried
    pub provider_count: usize,

    /// Providers that returned a response
    pub successful_providers: usize,

    /// Providers whose task ended in an error
    pub failed_providers: usize,

    /// Mean task latency in milliseconds
    pub average_latency_ms: f64,

    /// Fastest task latency in milliseconds
    pub min_latency_ms: u64,

    /// Slowest task latency in milliseconds
    pub max_latency_ms: u64,

    /// Records returned across all successful tasks, before deduplication
    pub total_records: usize,

    /// Records surviving deduplication
    pub unique_records: usize,

    /// Records collapsed as duplicates
    pub duplicate_records: usize,

    /// Sum of task latencies divided by wall-clock duration
    pub parallel_efficiency: f64,

    /// Per-provider breakdown
    pub providers: Vec<ProviderMetrics>,
}

impl ParallelSearchMetrics {
    /// Aggregate metrics from settled outcomes.
    ///
    /// Dedup counts come from `merged` when available; without it the run
    /// is reported as having no duplicates.
    pub fn build(
        outcomes: &[SearchOutcome],
        wall_clock: Duration,
        merged: Option<&MergedResults>,
    ) -> Self {
        let providers: Vec<ProviderMetrics> = outcomes
            .iter()
            .map(|outcome| ProviderMetrics {
                provider_id: outcome.provider_id.clone(),
                latency_ms: outcome.latency.as_millis() as u64,
                success: outcome.is_success(),
                record_count: outcome.records().len(),
                error: outcome.error().map(|e| e.to_string()),
            })
            .collect();

        let successful_providers = providers.iter().filter(|p| p.success).count();
        let total_records: usize = providers.iter().map(|p| p.record_count).sum();

        let latencies: Vec<u64> = providers.iter().map(|p| p.latency_ms).collect();
        let latency_sum: u64 = latencies.iter().sum();
        let average_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            latency_sum as f64 / latencies.len() as f64
        };

        let wall_ms = wall_clock.as_millis() as u64;
        let parallel_efficiency = if wall_ms == 0 {
            0.0
        } else {
            latency_sum as f64 / wall_ms as f64
        };

        let (unique_records, duplicate_records) = match merged {
            Some(merged) => (merged.records.len(), merged.duplicate_count),
            None => (total_records, 0),
        };

        Self {
            total_duration_ms: wall_ms,
            provider_count: providers.len(),
            successful_providers,
            failed_providers: providers.len() - successful_providers,
            average_latency_ms,
            min_latency_ms: latencies.iter().copied().min().unwrap_or(0),
            max_latency_ms: latencies.iter().copied().max().unwrap_or(0),
            total_records,
            unique_records,
            duplicate_records,
            parallel_efficiency,
            providers,
        }
    }
}

//! Parallel search orchestration.
//!
//! The [`Orchestrator`] is an explicit context object owned by the caller:
//! it holds the provider registry, the health monitor, the rate limiter
//! pool and the runtime configuration. Nothing in this crate keeps
//! process-global state, so isolated instances can coexist (and be tested)
//! freely.
//!
//! Control flow for a full run: provider selection (unless the caller pins
//! providers) → task scheduling → strategy execution → merge/dedup →
//! metrics.

mod executor;
mod health;
mod metrics;
mod scheduler;
mod select;

pub use executor::{ExecutionStrategy, ParallelSearchConfig, SearchOutcome};
pub use health::{HealthMonitor, ProviderHealth, RetryStrategy};
pub use metrics::{ParallelSearchMetrics, ProviderMetrics};
pub use scheduler::{create_search_tasks, optimal_concurrency, SearchTask};
pub use select::{
    classify_topic, score_providers, select_providers, CategoryMatch, ProviderScore,
    ScoringWeights, SelectionOutcome, TopicClassification, TopicTaxonomy,
};

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::OrchestratorConfig;
use crate::models::SearchQuery;
use crate::providers::{ErrorClassifier, Provider, ProviderRegistry};
use crate::utils::{merge_results, MergedResults, RateLimiterPool};

/// Errors the orchestrator can return before scheduling begins.
///
/// Per-task failures never surface here; they are captured into outcomes
/// and reported as warnings.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The candidate provider list was empty
    #[error("No candidate providers to search")]
    NoProviders,
}

/// Result of [`Orchestrator::execute_parallel_search`]
#[derive(Debug)]
pub struct ParallelSearchOutput {
    /// One settled outcome per scheduled task
    pub outcomes: Vec<SearchOutcome>,

    /// Run metrics, when performance monitoring is enabled
    pub metrics: Option<ParallelSearchMetrics>,

    /// Human-readable warnings for failed providers
    pub warnings: Vec<String>,
}

/// Result of a full orchestrated run ([`Orchestrator::run`])
#[derive(Debug)]
pub struct SearchRun {
    /// One settled outcome per scheduled task
    pub outcomes: Vec<SearchOutcome>,

    /// Merged (and possibly deduplicated) records
    pub merged: MergedResults,

    /// Run metrics, when performance monitoring is enabled
    pub metrics: Option<ParallelSearchMetrics>,

    /// Human-readable warnings for failed providers
    pub warnings: Vec<String>,

    /// Selection outcome, when providers were not pinned by the caller
    pub selection: Option<SelectionOutcome>,
}

/// Caller-owned orchestration context.
pub struct Orchestrator {
    registry: ProviderRegistry,
    health: HealthMonitor,
    limiters: RateLimiterPool,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("providers", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator over a registry with the given configuration
    pub fn new(registry: ProviderRegistry, config: OrchestratorConfig) -> Self {
        let health = HealthMonitor::new(config.retry.clone());
        let limiters = config.rate_limits.build_pool();
        Self {
            registry,
            health,
            limiters,
            config,
        }
    }

    /// Replace the error classifier.
    ///
    /// Intended to be called right after construction; the health monitor
    /// is rebuilt, discarding any statistics recorded so far.
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.health = HealthMonitor::new(self.config.retry.clone()).with_classifier(classifier);
        self
    }

    /// The provider registry
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Mutable access to the registry, e.g. to register providers
    pub fn registry_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.registry
    }

    /// The health monitor
    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    /// The runtime configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Pick candidate providers for a query
    pub fn select_providers(&self, query: &str) -> SelectionOutcome {
        select::select_providers(query, &self.registry, &self.health, &self.config.selection)
    }

    async fn execute_inner(
        &self,
        providers: &[Arc<dyn Provider>],
        query: &SearchQuery,
        config: &ParallelSearchConfig,
    ) -> (Vec<SearchOutcome>, Duration) {
        let started = Instant::now();

        let tasks = scheduler::create_search_tasks(&self.health, providers);
        let window = scheduler::optimal_concurrency(&tasks, config.max_concurrency);

        tracing::debug!(
            "Executing {} tasks with {} strategy (window {})",
            tasks.len(),
            config.strategy,
            window
        );

        let outcomes =
            executor::execute_tasks(&tasks, query, config, window, &self.health, &self.limiters)
                .await;

        (outcomes, started.elapsed())
    }

    fn collect_warnings(outcomes: &[SearchOutcome]) -> Vec<String> {
        outcomes
            .iter()
            .filter_map(|outcome| {
                outcome
                    .error()
                    .map(|error| format!("{} failed: {}", outcome.provider_id, error))
            })
            .collect()
    }

    /// Execute a search against an explicit provider set.
    ///
    /// Returns one outcome per provider regardless of individual results;
    /// errors only when `providers` is empty.
    pub async fn execute_parallel_search(
        &self,
        providers: &[Arc<dyn Provider>],
        query: &SearchQuery,
        config: &ParallelSearchConfig,
    ) -> Result<ParallelSearchOutput, OrchestratorError> {
        if providers.is_empty() {
            return Err(OrchestratorError::NoProviders);
        }

        let (outcomes, wall_clock) = self.execute_inner(providers, query, config).await;
        let warnings = Self::collect_warnings(&outcomes);
        let metrics = config
            .enable_performance_monitoring
            .then(|| ParallelSearchMetrics::build(&outcomes, wall_clock, None));

        Ok(ParallelSearchOutput {
            outcomes,
            metrics,
            warnings,
        })
    }

    /// Run the full pipeline: selection (unless pinned), execution, merge,
    /// metrics.
    pub async fn run(
        &self,
        query: &SearchQuery,
        pinned: Option<&[String]>,
        config: &ParallelSearchConfig,
    ) -> Result<SearchRun, OrchestratorError> {
        let (provider_ids, selection) = match pinned {
            Some(ids) if !ids.is_empty() => (ids.to_vec(), None),
            _ => {
                let selection = self.select_providers(&query.query);
                (selection.providers.clone(), Some(selection))
            }
        };

        let providers = self.registry.resolve(&provider_ids);
        if providers.is_empty() {
            return Err(OrchestratorError::NoProviders);
        }

        let (outcomes, wall_clock) = self.execute_inner(&providers, query, config).await;
        let merged = merge_results(&outcomes, config.enable_deduplication);
        let warnings = Self::collect_warnings(&outcomes);
        let metrics = config
            .enable_performance_monitoring
            .then(|| ParallelSearchMetrics::build(&outcomes, wall_clock, Some(&merged)));

        if !warnings.is_empty() {
            tracing::info!(
                "Run finished with {} of {} providers failing",
                warnings.len(),
                outcomes.len()
            );
        }

        Ok(SearchRun {
            outcomes,
            merged,
            metrics,
            warnings,
            selection,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchResponse;
    use crate::providers::mock::make_record;
    use crate::providers::{MockProvider, ProviderError};

    fn orchestrator_with(providers: Vec<Arc<MockProvider>>) -> Orchestrator {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(provider);
        }
        Orchestrator::new(registry, OrchestratorConfig::default())
    }

    fn responding_provider(id: &str, records: usize) -> Arc<MockProvider> {
        let provider = MockProvider::new(id);
        let records = (0..records)
            .map(|i| make_record(&format!("{}-{}", id, i), &format!("Title {}", i), id))
            .collect();
        provider.set_response(SearchResponse::new(records, id, "test"));
        Arc::new(provider)
    }

    #[tokio::test]
    async fn test_empty_provider_list_is_an_error() {
        let orchestrator = orchestrator_with(vec![]);
        let query = SearchQuery::new("test");

        let result = orchestrator
            .execute_parallel_search(&[], &query, &ParallelSearchConfig::default())
            .await;

        assert!(matches!(result, Err(OrchestratorError::NoProviders)));
    }

    #[tokio::test]
    async fn test_run_with_pinned_providers() {
        let orchestrator = orchestrator_with(vec![
            responding_provider("alpha", 2),
            responding_provider("beta", 1),
        ]);
        let query = SearchQuery::new("test");

        let run = orchestrator
            .run(
                &query,
                Some(&["alpha".to_string()]),
                &ParallelSearchConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(run.outcomes.len(), 1);
        assert_eq!(run.merged.records.len(), 2);
        assert!(run.selection.is_none());
        assert!(run.warnings.is_empty());
        assert!(run.metrics.is_some());
    }

    #[tokio::test]
    async fn test_run_selects_when_not_pinned() {
        let orchestrator = orchestrator_with(vec![
            responding_provider("alpha", 1),
            responding_provider("beta", 1),
        ]);
        let query = SearchQuery::new("deep learning for cancer diagnosis");

        let run = orchestrator
            .run(&query, None, &ParallelSearchConfig::default())
            .await
            .unwrap();

        assert!(run.selection.is_some());
        assert_eq!(run.outcomes.len(), 2);
        assert_eq!(run.merged.records.len(), 2);
    }

    #[tokio::test]
    async fn test_failures_become_warnings() {
        let failing = Arc::new(MockProvider::new("flaky"));
        failing.fail_times(10, ProviderError::AuthFailed("bad key".into()));

        let orchestrator =
            orchestrator_with(vec![responding_provider("alpha", 1), failing]);
        let query = SearchQuery::new("test");

        let output = orchestrator
            .execute_parallel_search(
                &orchestrator.registry().resolve(&[
                    "alpha".to_string(),
                    "flaky".to_string(),
                ]),
                &query,
                &ParallelSearchConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(output.outcomes.len(), 2);
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].contains("flaky"));
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let orchestrator = orchestrator_with(vec![responding_provider("alpha", 1)]);
        let query = SearchQuery::new("test");
        let config = ParallelSearchConfig {
            enable_performance_monitoring: false,
            ..ParallelSearchConfig::default()
        };

        let run = orchestrator
            .run(&query, Some(&["alpha".to_string()]), &config)
            .await
            .unwrap();

        assert!(run.metrics.is_none());
    }

    #[tokio::test]
    async fn test_run_unknown_pinned_provider_errors() {
        let orchestrator = orchestrator_with(vec![responding_provider("alpha", 1)]);
        let query = SearchQuery::new("test");

        let result = orchestrator
            .run(
                &query,
                Some(&["missing".to_string()]),
                &ParallelSearchConfig::default(),
            )
            .await;

        assert!(matches!(result, Err(OrchestratorError::NoProviders)));
    }
}

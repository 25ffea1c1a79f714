//! Task scheduling: priority ordering and concurrency sizing.

use std::sync::Arc;

use crate::orchestrator::health::HealthMonitor;
use crate::providers::Provider;

/// One scheduled provider call, valid for a single orchestration run
#[derive(Debug, Clone)]
pub struct SearchTask {
    /// Provider to call
    pub provider: Arc<dyn Provider>,

    /// Scheduling priority (higher runs earlier)
    pub priority: f64,

    /// Expected latency in milliseconds, from health data
    pub expected_latency_ms: f64,

    /// Expected success rate, from health data
    pub reliability: f64,
}

/// Build priority-ordered tasks for the given providers.
///
/// Priority is `success_rate × 100 − average_latency_ms / 10`. Providers
/// without a health record get optimistic defaults (reliability 1.0,
/// latency 0); peeking at health never creates a record. Ties are broken by
/// provider id so the ordering is deterministic.
pub fn create_search_tasks(
    health: &HealthMonitor,
    providers: &[Arc<dyn Provider>],
) -> Vec<SearchTask> {
    let mut tasks: Vec<SearchTask> = providers
        .iter()
        .map(|provider| {
            let (reliability, expected_latency_ms) = health
                .health(provider.id())
                .map(|record| (record.success_rate, record.average_latency_ms))
                .unwrap_or((1.0, 0.0));

            SearchTask {
                provider: Arc::clone(provider),
                priority: reliability * 100.0 - expected_latency_ms / 10.0,
                expected_latency_ms,
                reliability,
            }
        })
        .collect();

    tasks.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.provider.id().cmp(b.provider.id()))
    });

    tasks
}

/// Compute the bounded in-flight window for a task set.
///
/// Starts from `max_concurrency`; shrinks to 60 % of it when more than 30 %
/// of tasks look unreliable (reliability ≤ 0.7), grows by 50 % (still capped
/// at `max_concurrency`) when the mean expected latency exceeds 5 s, and is
/// finally clamped to `[1, min(max_concurrency, task count)]`.
pub fn optimal_concurrency(tasks: &[SearchTask], max_concurrency: usize) -> usize {
    if tasks.is_empty() {
        return 1;
    }

    let max = max_concurrency.max(1);
    let mut concurrency = max as f64;

    let unreliable = tasks.iter().filter(|t| t.reliability <= 0.7).count();
    if unreliable as f64 / tasks.len() as f64 > 0.3 {
        concurrency = max as f64 * 0.6;
    }

    let avg_latency =
        tasks.iter().map(|t| t.expected_latency_ms).sum::<f64>() / tasks.len() as f64;
    if avg_latency > 5000.0 {
        concurrency = (concurrency * 1.5).min(max as f64);
    }

    (concurrency.floor() as usize).clamp(1, max.min(tasks.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MockProvider, ProviderError};
    use std::time::Duration;

    fn providers(ids: &[&str]) -> Vec<Arc<dyn Provider>> {
        ids.iter()
            .map(|id| Arc::new(MockProvider::new(*id)) as Arc<dyn Provider>)
            .collect()
    }

    fn task(reliability: f64, latency_ms: f64) -> SearchTask {
        SearchTask {
            provider: Arc::new(MockProvider::new("x")),
            priority: 0.0,
            expected_latency_ms: latency_ms,
            reliability,
        }
    }

    #[test]
    fn test_tasks_ordered_by_priority() {
        let health = HealthMonitor::default();

        // alpha: perfect, fast. beta: slow. gamma: flaky.
        health.record_success("alpha", Duration::from_millis(100));
        health.record_success("beta", Duration::from_millis(4000));
        health.record_success("gamma", Duration::from_millis(100));
        health.record_failure("gamma", &ProviderError::Timeout);

        let tasks = create_search_tasks(&health, &providers(&["beta", "gamma", "alpha"]));

        assert_eq!(tasks[0].provider.id(), "alpha");
        assert_eq!(tasks[1].provider.id(), "gamma");
        assert_eq!(tasks[2].provider.id(), "beta");
    }

    #[test]
    fn test_unseen_providers_get_defaults() {
        let health = HealthMonitor::default();
        let tasks = create_search_tasks(&health, &providers(&["beta", "alpha"]));

        assert!((tasks[0].priority - 100.0).abs() < f64::EPSILON);
        // Equal priority: tie broken by id.
        assert_eq!(tasks[0].provider.id(), "alpha");
        // Peeking must not create records.
        assert!(health.health("alpha").is_none());
    }

    #[test]
    fn test_concurrency_reduced_for_unreliable_tasks() {
        let tasks = vec![task(0.5, 100.0), task(0.6, 100.0), task(1.0, 100.0)];
        // 2 of 3 unreliable: 60% of 10 = 6, then clamped to the task count.
        assert_eq!(optimal_concurrency(&tasks, 10), 3);

        let many: Vec<_> = (0..10).map(|_| task(0.5, 100.0)).collect();
        assert_eq!(optimal_concurrency(&many, 10), 6);
    }

    #[test]
    fn test_concurrency_increased_for_slow_tasks() {
        let tasks: Vec<_> = (0..10).map(|_| task(1.0, 6000.0)).collect();
        // Slow but reliable: 1.5× would exceed max, capped at 10.
        assert_eq!(optimal_concurrency(&tasks, 10), 10);

        let mixed: Vec<_> = (0..10)
            .map(|i| task(if i < 5 { 0.5 } else { 1.0 }, 6000.0))
            .collect();
        // Unreliable (6) then slow boost: 6 × 1.5 = 9.
        assert_eq!(optimal_concurrency(&mixed, 10), 9);
    }

    #[test]
    fn test_concurrency_clamped() {
        let tasks = vec![task(1.0, 100.0), task(1.0, 100.0)];
        assert_eq!(optimal_concurrency(&tasks, 10), 2);
        assert_eq!(optimal_concurrency(&tasks, 0), 1);
        assert_eq!(optimal_concurrency(&[], 10), 1);
    }
}

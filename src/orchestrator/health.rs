//! Per-provider health tracking and retry policy.
//!
//! The health monitor keeps running success/failure statistics for every
//! provider it has seen, derives a retry strategy from them, and exposes the
//! health flag that gates provider selection. Records are created lazily on
//! first observation and live for the lifetime of the monitor.
//!
//! The unhealthy flag is sticky: it flips false once the consecutive-failure
//! threshold is reached and clears only on a later success or an explicit
//! reset, never by elapsed time.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::RwLock;
use tokio::time::{sleep, Instant};

use crate::config::RetryPolicy;
use crate::models::ProbeResult;
use crate::providers::{default_classifier, ErrorClassifier, ErrorKind, Provider, ProviderError};

/// Running health statistics for one provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    /// Provider identifier
    pub provider_id: String,

    /// Number of successful calls
    pub success_count: u64,

    /// Number of failed calls
    pub failure_count: u64,

    /// Total calls observed (success_count + failure_count)
    pub total_requests: u64,

    /// success_count / total_requests; 1.0 before any observation
    pub success_rate: f64,

    /// Running mean latency over successful calls, in milliseconds
    pub average_latency_ms: f64,

    /// Current consecutive-failure streak
    pub consecutive_failures: u32,

    /// Sticky health flag; false once the failure threshold is reached
    pub is_healthy: bool,

    /// When this provider was last observed or probed
    pub last_checked: DateTime<Utc>,
}

impl ProviderHealth {
    fn new(provider_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            success_count: 0,
            failure_count: 0,
            total_requests: 0,
            success_rate: 1.0,
            average_latency_ms: 0.0,
            consecutive_failures: 0,
            is_healthy: true,
            last_checked: Utc::now(),
        }
    }

    fn recompute_rate(&mut self) {
        self.success_rate = if self.total_requests == 0 {
            1.0
        } else {
            self.success_count as f64 / self.total_requests as f64
        };
    }
}

/// Retry behavior derived for one provider from its current health
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    /// Maximum number of retries (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on the backoff delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub backoff_multiplier: f64,
    /// Error categories that trigger a retry
    pub retryable: HashSet<ErrorKind>,
}

/// Tracks provider health and wraps provider calls with retry.
///
/// One monitor instance is owned by the orchestrator context; nothing here
/// is process-global, so tests can run against isolated fixtures.
pub struct HealthMonitor {
    records: RwLock<HashMap<String, ProviderHealth>>,
    probes: RwLock<HashMap<String, (Instant, ProbeResult)>>,
    policy: RetryPolicy,
    classifier: ErrorClassifier,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl HealthMonitor {
    /// Create a monitor with the given base retry policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            probes: RwLock::new(HashMap::new()),
            policy,
            classifier: default_classifier(),
        }
    }

    /// Replace the error classifier
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Record a successful call and its latency
    pub fn record_success(&self, provider_id: &str, latency: Duration) {
        let mut records = self.records.write().expect("RwLock poisoned");
        let record = records
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderHealth::new(provider_id));

        record.success_count += 1;
        record.total_requests += 1;
        record.consecutive_failures = 0;
        record.recompute_rate();

        let n = record.success_count as f64;
        let latency_ms = latency.as_secs_f64() * 1000.0;
        record.average_latency_ms = (record.average_latency_ms * (n - 1.0) + latency_ms) / n;

        record.is_healthy = true;
        record.last_checked = Utc::now();
    }

    /// Record a failed call
    pub fn record_failure(&self, provider_id: &str, error: &ProviderError) {
        let mut records = self.records.write().expect("RwLock poisoned");
        let record = records
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderHealth::new(provider_id));

        record.failure_count += 1;
        record.total_requests += 1;
        record.consecutive_failures += 1;
        record.recompute_rate();
        record.last_checked = Utc::now();

        if record.consecutive_failures >= self.policy.failure_threshold && record.is_healthy {
            record.is_healthy = false;
            tracing::warn!(
                "Provider {} marked unhealthy after {} consecutive failures: {}",
                provider_id,
                record.consecutive_failures,
                error
            );
        }
    }

    /// Whether a provider is currently eligible: sticky flag set and
    /// success rate above 0.5. Unseen providers are healthy.
    pub fn is_healthy(&self, provider_id: &str) -> bool {
        let records = self.records.read().expect("RwLock poisoned");
        match records.get(provider_id) {
            Some(record) => record.is_healthy && record.success_rate > 0.5,
            None => true,
        }
    }

    /// Current health record for a provider, if one exists
    pub fn health(&self, provider_id: &str) -> Option<ProviderHealth> {
        let records = self.records.read().expect("RwLock poisoned");
        records.get(provider_id).cloned()
    }

    /// Snapshot of all health records
    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        let records = self.records.read().expect("RwLock poisoned");
        let mut snapshot: Vec<_> = records.values().cloned().collect();
        snapshot.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        snapshot
    }

    /// Reset a provider's record (clears the sticky unhealthy flag)
    pub fn reset(&self, provider_id: &str) {
        let mut records = self.records.write().expect("RwLock poisoned");
        records.insert(
            provider_id.to_string(),
            ProviderHealth::new(provider_id),
        );
        let mut probes = self.probes.write().expect("RwLock poisoned");
        probes.remove(provider_id);
    }

    /// Derive the retry strategy for a provider from its current health.
    ///
    /// Degraded providers (success rate below the configured threshold) get
    /// fewer retries and a shorter delay cap; an active failure streak
    /// scales the initial delay by the streak length.
    pub fn retry_strategy(&self, provider_id: &str) -> RetryStrategy {
        let records = self.records.read().expect("RwLock poisoned");
        let (success_rate, consecutive_failures) = records
            .get(provider_id)
            .map(|r| (r.success_rate, r.consecutive_failures))
            .unwrap_or((1.0, 0));

        let mut max_retries = self.policy.max_retries;
        let mut max_delay = Duration::from_millis(self.policy.max_delay_ms);
        let mut initial_delay = Duration::from_millis(self.policy.initial_delay_ms);

        if success_rate < self.policy.degraded_rate_threshold {
            max_retries = self.policy.degraded_max_retries;
            max_delay = Duration::from_millis(self.policy.degraded_max_delay_ms);
        }

        if consecutive_failures > 0 {
            initial_delay *= consecutive_failures;
        }

        RetryStrategy {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier: self.policy.backoff_multiplier,
            retryable: self.policy.retryable.iter().copied().collect(),
        }
    }

    /// Execute an operation with retry and health bookkeeping.
    ///
    /// Every attempt is recorded. Non-retryable errors and exhausted budgets
    /// return the last error; otherwise the current backoff delay is slept
    /// and doubled (capped) before the next attempt.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        provider_id: &str,
        mut operation: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let strategy = self.retry_strategy(provider_id);
        let mut delay = strategy.initial_delay;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let started = Instant::now();

            match operation().await {
                Ok(result) => {
                    self.record_success(provider_id, started.elapsed());
                    if attempt > 1 {
                        tracing::debug!(
                            "Provider {} succeeded on attempt {}",
                            provider_id,
                            attempt
                        );
                    }
                    return Ok(result);
                }
                Err(error) => {
                    self.record_failure(provider_id, &error);
                    let kind = (self.classifier)(&error);

                    if !strategy.retryable.contains(&kind) {
                        tracing::debug!(
                            "Provider {} failed with non-retryable {:?}: {}",
                            provider_id,
                            kind,
                            error
                        );
                        return Err(error);
                    }

                    if attempt > strategy.max_retries {
                        tracing::warn!(
                            "Provider {} exhausted retries after {} attempts: {}",
                            provider_id,
                            attempt,
                            error
                        );
                        return Err(error);
                    }

                    tracing::debug!(
                        "Provider {} attempt {} failed ({:?}), retrying in {:?}",
                        provider_id,
                        attempt,
                        kind,
                        delay
                    );
                    sleep(delay).await;
                    delay = delay
                        .mul_f64(strategy.backoff_multiplier)
                        .min(strategy.max_delay);
                }
            }
        }
    }

    /// Probe a provider, serving cached results younger than the probe TTL.
    ///
    /// A failed or unsupported probe yields an unhealthy result; probing
    /// never touches the success/failure counters.
    pub async fn check_health(&self, provider: &dyn Provider) -> ProbeResult {
        let provider_id = provider.id().to_string();
        let ttl = Duration::from_secs(self.policy.probe_ttl_seconds);

        {
            let probes = self.probes.read().expect("RwLock poisoned");
            if let Some((probed_at, result)) = probes.get(&provider_id) {
                if probed_at.elapsed() < ttl {
                    return *result;
                }
            }
        }

        let started = Instant::now();
        let outcome = provider.probe().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(probe) => probe,
            Err(error) => {
                tracing::debug!("Probe failed for {}: {}", provider_id, error);
                ProbeResult::unhealthy(latency_ms)
            }
        };

        {
            let mut probes = self.probes.write().expect("RwLock poisoned");
            probes.insert(provider_id.clone(), (Instant::now(), result));
        }
        {
            let mut records = self.records.write().expect("RwLock poisoned");
            records
                .entry(provider_id.clone())
                .or_insert_with(|| ProviderHealth::new(&provider_id))
                .last_checked = Utc::now();
        }

        result
    }

    /// Healthy providers not in `failed`, ordered by success rate descending
    pub fn suggested_fallbacks(&self, failed: &[String], all: &[String]) -> Vec<String> {
        let mut candidates: Vec<(String, f64)> = all
            .iter()
            .filter(|id| !failed.contains(id))
            .filter(|id| self.is_healthy(id))
            .map(|id| {
                let rate = self.health(id).map(|r| r.success_rate).unwrap_or(1.0);
                (id.clone(), rate)
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        candidates.into_iter().map(|(id, _)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockProvider;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay_ms: 1,
            max_delay_ms: 10,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_counters_and_rate() {
        let monitor = HealthMonitor::default();

        monitor.record_success("alpha", Duration::from_millis(100));
        monitor.record_failure("alpha", &ProviderError::Timeout);
        monitor.record_success("alpha", Duration::from_millis(300));

        let health = monitor.health("alpha").unwrap();
        assert_eq!(health.success_count, 2);
        assert_eq!(health.failure_count, 1);
        assert_eq!(health.total_requests, 3);
        assert!((health.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((health.average_latency_ms - 200.0).abs() < 1.0);
    }

    #[test]
    fn test_success_resets_streak() {
        let monitor = HealthMonitor::default();

        monitor.record_failure("alpha", &ProviderError::Timeout);
        monitor.record_failure("alpha", &ProviderError::Timeout);
        assert_eq!(monitor.health("alpha").unwrap().consecutive_failures, 2);
        assert!(monitor.health("alpha").unwrap().is_healthy);

        monitor.record_success("alpha", Duration::from_millis(50));
        assert_eq!(monitor.health("alpha").unwrap().consecutive_failures, 0);
    }

    #[test]
    fn test_unhealthy_at_third_consecutive_failure() {
        let monitor = HealthMonitor::default();

        monitor.record_failure("alpha", &ProviderError::Timeout);
        monitor.record_failure("alpha", &ProviderError::Timeout);
        assert!(monitor.health("alpha").unwrap().is_healthy);

        monitor.record_failure("alpha", &ProviderError::Timeout);
        assert!(!monitor.health("alpha").unwrap().is_healthy);
        assert!(!monitor.is_healthy("alpha"));
    }

    #[test]
    fn test_flag_sticky_until_success_or_reset() {
        let monitor = HealthMonitor::default();

        for _ in 0..3 {
            monitor.record_failure("alpha", &ProviderError::Timeout);
        }
        assert!(!monitor.health("alpha").unwrap().is_healthy);

        // A later success clears the flag.
        monitor.record_success("alpha", Duration::from_millis(10));
        assert!(monitor.health("alpha").unwrap().is_healthy);

        for _ in 0..3 {
            monitor.record_failure("beta", &ProviderError::Timeout);
        }
        monitor.reset("beta");
        let health = monitor.health("beta").unwrap();
        assert!(health.is_healthy);
        assert_eq!(health.total_requests, 0);
    }

    #[test]
    fn test_is_healthy_requires_rate_above_half() {
        let monitor = HealthMonitor::default();

        // Flag stays true (streak never reaches 3) but the rate drops to 0.5.
        monitor.record_success("alpha", Duration::from_millis(10));
        monitor.record_failure("alpha", &ProviderError::Timeout);
        assert!(monitor.health("alpha").unwrap().is_healthy);
        assert!(!monitor.is_healthy("alpha"));
    }

    #[test]
    fn test_unseen_provider_is_healthy() {
        let monitor = HealthMonitor::default();
        assert!(monitor.is_healthy("never-seen"));
        assert!(monitor.health("never-seen").is_none());
    }

    #[test]
    fn test_retry_strategy_base_and_degraded() {
        let monitor = HealthMonitor::default();

        let base = monitor.retry_strategy("alpha");
        assert_eq!(base.max_retries, 3);
        assert_eq!(base.initial_delay, Duration::from_millis(1000));
        assert_eq!(base.max_delay, Duration::from_millis(10_000));

        // Degrade the provider below the 0.7 rate threshold.
        monitor.record_success("alpha", Duration::from_millis(10));
        monitor.record_failure("alpha", &ProviderError::Timeout);

        let degraded = monitor.retry_strategy("alpha");
        assert_eq!(degraded.max_retries, 2);
        assert_eq!(degraded.max_delay, Duration::from_millis(5000));
        // consecutive_failures == 1 scales the initial delay by 1.
        assert_eq!(degraded.initial_delay, Duration::from_millis(1000));

        monitor.record_failure("alpha", &ProviderError::Timeout);
        let streaked = monitor.retry_strategy("alpha");
        assert_eq!(streaked.initial_delay, Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_retry_succeeds_after_failures() {
        let monitor = HealthMonitor::new(fast_policy());
        let attempts = Arc::new(AtomicU32::new(0));

        let result = {
            let attempts = attempts.clone();
            monitor
                .execute_with_retry("alpha", move || {
                    let attempts = attempts.clone();
                    async move {
                        let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                        if n <= 3 {
                            Err(ProviderError::Connection("refused".into()))
                        } else {
                            Ok("success")
                        }
                    }
                })
                .await
        };

        // Fails exactly max_retries times, then succeeds: 4 total attempts.
        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 4);

        let health = monitor.health("alpha").unwrap();
        assert_eq!(health.failure_count, 3);
        assert_eq!(health.success_count, 1);
        assert_eq!(health.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_retry_exhausts_budget() {
        let monitor = HealthMonitor::new(fast_policy());
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = {
            let attempts = attempts.clone();
            monitor
                .execute_with_retry("alpha", move || {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err(ProviderError::Server("boom".into()))
                    }
                })
                .await
        };

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_execute_with_retry_permanent_error_no_retry() {
        let monitor = HealthMonitor::new(fast_policy());
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = {
            let attempts = attempts.clone();
            monitor
                .execute_with_retry("alpha", move || {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err(ProviderError::AuthFailed("bad key".into()))
                    }
                })
                .await
        };

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_cache() {
        let monitor = HealthMonitor::default();
        let provider = MockProvider::new("alpha");

        let first = monitor.check_health(&provider).await;
        assert!(first.healthy);
        assert_eq!(provider.probe_count(), 1);

        // Within the TTL the cached result is served without a new probe.
        let second = monitor.check_health(&provider).await;
        assert!(second.healthy);
        assert_eq!(provider.probe_count(), 1);

        // After the TTL the provider is probed again.
        tokio::time::advance(Duration::from_secs(61)).await;
        let third = monitor.check_health(&provider).await;
        assert!(third.healthy);
        assert_eq!(provider.probe_count(), 2);
    }

    #[test]
    fn test_suggested_fallbacks() {
        let monitor = HealthMonitor::default();

        monitor.record_success("alpha", Duration::from_millis(10));
        monitor.record_success("beta", Duration::from_millis(10));
        monitor.record_failure("beta", &ProviderError::Timeout);
        monitor.record_success("beta", Duration::from_millis(10));
        for _ in 0..3 {
            monitor.record_failure("gamma", &ProviderError::Timeout);
        }

        let all = vec![
            "alpha".to_string(),
            "beta".to_string(),
            "gamma".to_string(),
            "delta".to_string(),
        ];
        let failed = vec!["alpha".to_string()];

        let fallbacks = monitor.suggested_fallbacks(&failed, &all);
        // gamma is unhealthy, alpha already failed; delta (unseen, rate 1.0)
        // sorts ahead of beta (rate 2/3).
        assert_eq!(fallbacks, vec!["delta".to_string(), "beta".to_string()]);
    }
}

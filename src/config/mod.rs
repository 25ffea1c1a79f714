//! Configuration management.

mod file_config;

pub use file_config::{find_config_file, ConfigFileError, OrchestratorConfigFile};

use serde::{Deserialize, Serialize};

use crate::orchestrator::{ParallelSearchConfig, ScoringWeights, TopicTaxonomy};
use crate::providers::ErrorKind;
use crate::utils::{BucketSettings, RateLimiterPool};

/// Top-level runtime configuration for the orchestrator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Base retry and health policy
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Rate limiting settings
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Provider selection settings
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Default parallel search settings
    #[serde(default)]
    pub search: ParallelSearchConfig,
}

/// Base retry policy and health thresholds.
///
/// The health monitor derives per-provider [`RetryStrategy`] values from
/// this policy and the provider's current statistics.
///
/// [`RetryStrategy`]: crate::orchestrator::RetryStrategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retries for healthy providers (total attempts = retries + 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on the backoff delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier applied after each retry
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Retries granted to degraded providers
    #[serde(default = "default_degraded_max_retries")]
    pub degraded_max_retries: u32,

    /// Delay cap for degraded providers, in milliseconds
    #[serde(default = "default_degraded_max_delay_ms")]
    pub degraded_max_delay_ms: u64,

    /// Success rate below which a provider counts as degraded
    #[serde(default = "default_degraded_rate_threshold")]
    pub degraded_rate_threshold: f64,

    /// Consecutive failures before the sticky unhealthy flag is set
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long probe results are cached, in seconds
    #[serde(default = "default_probe_ttl_seconds")]
    pub probe_ttl_seconds: u64,

    /// Error categories that trigger a retry
    #[serde(default = "default_retryable")]
    pub retryable: Vec<ErrorKind>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_degraded_max_retries() -> u32 {
    2
}

fn default_degraded_max_delay_ms() -> u64 {
    5000
}

fn default_degraded_rate_threshold() -> f64 {
    0.7
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_probe_ttl_seconds() -> u64 {
    60
}

fn default_retryable() -> Vec<ErrorKind> {
    vec![
        ErrorKind::Timeout,
        ErrorKind::RateLimited,
        ErrorKind::Connection,
        ErrorKind::ServerError,
    ]
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            degraded_max_retries: default_degraded_max_retries(),
            degraded_max_delay_ms: default_degraded_max_delay_ms(),
            degraded_rate_threshold: default_degraded_rate_threshold(),
            failure_threshold: default_failure_threshold(),
            probe_ttl_seconds: default_probe_ttl_seconds(),
            retryable: default_retryable(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Burst cap used for providers without an override
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: f64,

    /// Refill rate (tokens per second) used for providers without an override
    #[serde(default = "default_refill_rate")]
    pub default_refill_rate: f64,

    /// Per-provider overrides
    #[serde(default)]
    pub provider_rates: Vec<ProviderRateConfig>,
}

fn default_max_tokens() -> f64 {
    5.0
}

fn default_refill_rate() -> f64 {
    2.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: default_max_tokens(),
            default_refill_rate: default_refill_rate(),
            provider_rates: Vec::new(),
        }
    }
}

/// Per-provider rate limit override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRateConfig {
    /// Provider identifier
    pub provider: String,
    /// Burst cap for this provider
    pub max_tokens: f64,
    /// Refill rate (tokens per second) for this provider
    pub refill_rate: f64,
}

impl RateLimitConfig {
    /// Build the limiter pool described by this configuration
    pub fn build_pool(&self) -> RateLimiterPool {
        let defaults = BucketSettings {
            max_tokens: self.default_max_tokens,
            refill_rate: self.default_refill_rate,
        };
        let overrides = self
            .provider_rates
            .iter()
            .map(|rate| {
                (
                    rate.provider.clone(),
                    BucketSettings {
                        max_tokens: rate.max_tokens,
                        refill_rate: rate.refill_rate,
                    },
                )
            })
            .collect();
        RateLimiterPool::with_overrides(defaults, overrides)
    }
}

/// Provider selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Providers with an observed success rate below this are excluded
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,

    /// Latency at or under which a provider earns the full speed score
    #[serde(default = "default_target_latency_ms")]
    pub target_latency_ms: f64,

    /// How many providers the selector picks
    #[serde(default = "default_max_selected")]
    pub max_selected: usize,

    /// Whether open-access providers get the scoring bonus
    #[serde(default)]
    pub prioritize_open_access: bool,

    /// Broad-coverage providers offered as fallbacks
    #[serde(default)]
    pub fallback_providers: Vec<String>,

    /// Scoring weight coefficients
    #[serde(default)]
    pub weights: ScoringWeights,

    /// Keyword taxonomy driving topic classification
    #[serde(default = "TopicTaxonomy::builtin")]
    pub taxonomy: TopicTaxonomy,
}

fn default_min_success_rate() -> f64 {
    0.3
}

fn default_target_latency_ms() -> f64 {
    2000.0
}

fn default_max_selected() -> usize {
    5
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_success_rate: default_min_success_rate(),
            target_latency_ms: default_target_latency_ms(),
            max_selected: default_max_selected(),
            prioritize_open_access: false,
            fallback_providers: Vec::new(),
            weights: ScoringWeights::default(),
            taxonomy: TopicTaxonomy::builtin(),
        }
    }
}

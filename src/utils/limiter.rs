//! Token-bucket rate limiting for provider calls.
//!
//! Every provider gets its own bucket: permits accumulate over time up to a
//! cap and each admitted call drains one. [`TokenBucket::acquire`] suspends
//! the task (never a thread) until a token is available — this primitive
//! cannot fail, only delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Mutable bucket state, guarded by an async mutex
#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket admitting one call per token.
///
/// `refill_rate` is tokens per second; `max_tokens` caps the burst size.
#[derive(Debug)]
pub struct TokenBucket {
    max_tokens: f64,
    refill_rate: f64,
    state: tokio::sync::Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket that starts full.
    ///
    /// `max_tokens` is clamped to at least 1.0 and `refill_rate` to a small
    /// positive value so a misconfigured bucket delays instead of dividing
    /// by zero.
    pub fn new(max_tokens: f64, refill_rate: f64) -> Self {
        let max_tokens = max_tokens.max(1.0);
        Self {
            max_tokens,
            refill_rate: refill_rate.max(0.001),
            state: tokio::sync::Mutex::new(BucketState {
                tokens: max_tokens,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        state.last_refill = now;
    }

    /// Wait until a token is available, then consume it.
    ///
    /// The lock is held across the wait, so concurrent callers are admitted
    /// in natural call order — there is no fairness queue beyond that.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        loop {
            self.refill(&mut state);
            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return;
            }
            let wait = (1.0 - state.tokens) / self.refill_rate;
            sleep(Duration::from_secs_f64(wait)).await;
        }
    }

    /// Current token count after refill (diagnostic)
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }

    /// Burst cap for this bucket
    pub fn max_tokens(&self) -> f64 {
        self.max_tokens
    }
}

/// Per-provider rate-limit settings
#[derive(Debug, Clone, Copy)]
pub struct BucketSettings {
    /// Burst cap
    pub max_tokens: f64,
    /// Tokens added per second
    pub refill_rate: f64,
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            max_tokens: 5.0,
            refill_rate: 2.0,
        }
    }
}

/// Pool of token buckets, one per provider id.
///
/// Buckets are created lazily on first use and live for the lifetime of the
/// pool. Per-provider overrides take precedence over the default settings.
#[derive(Debug, Default)]
pub struct RateLimiterPool {
    defaults: BucketSettings,
    overrides: HashMap<String, BucketSettings>,
    buckets: RwLock<HashMap<String, Arc<TokenBucket>>>,
}

impl RateLimiterPool {
    /// Create a pool with default settings for every provider
    pub fn new(defaults: BucketSettings) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Create a pool with per-provider overrides
    pub fn with_overrides(
        defaults: BucketSettings,
        overrides: HashMap<String, BucketSettings>,
    ) -> Self {
        Self {
            defaults,
            overrides,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the bucket for a provider
    pub fn get(&self, provider_id: &str) -> Arc<TokenBucket> {
        {
            let read_guard = self.buckets.read().expect("RwLock poisoned");
            if let Some(bucket) = read_guard.get(provider_id) {
                return Arc::clone(bucket);
            }
        }

        let mut write_guard = self.buckets.write().expect("RwLock poisoned");
        // Double-check after acquiring write lock
        if let Some(bucket) = write_guard.get(provider_id) {
            return Arc::clone(bucket);
        }

        let settings = self
            .overrides
            .get(provider_id)
            .copied()
            .unwrap_or(self.defaults);
        let bucket = Arc::new(TokenBucket::new(settings.max_tokens, settings.refill_rate));
        write_guard.insert(provider_id.to_string(), Arc::clone(&bucket));
        bucket
    }

    /// Acquire one token for a provider
    pub async fn acquire(&self, provider_id: &str) {
        self.get(provider_id).acquire().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bucket_starts_full() {
        let bucket = TokenBucket::new(3.0, 1.0);
        assert!((bucket.available().await - 3.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_acquire_consumes_one_token() {
        let bucket = TokenBucket::new(3.0, 0.001);
        bucket.acquire().await;
        bucket.acquire().await;
        let remaining = bucket.available().await;
        assert!(remaining < 1.1, "expected ~1 token, got {}", remaining);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let bucket = TokenBucket::new(1.0, 2.0);
        bucket.acquire().await;

        // Bucket is empty; the next acquire must wait ~0.5s for one token.
        let before = Instant::now();
        bucket.acquire().await;
        let waited = before.elapsed();

        assert!(waited >= Duration::from_millis(400), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(700), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_capped_at_max() {
        let bucket = TokenBucket::new(2.0, 100.0);
        bucket.acquire().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        let available = bucket.available().await;
        assert!(available <= 2.0, "available {}", available);
    }

    #[tokio::test]
    async fn test_tokens_never_negative() {
        let bucket = TokenBucket::new(1.0, 50.0);
        for _ in 0..5 {
            bucket.acquire().await;
        }
        assert!(bucket.available().await >= 0.0);
    }

    #[test]
    fn test_pool_reuses_buckets() {
        let pool = RateLimiterPool::new(BucketSettings::default());

        let first = pool.get("alpha");
        let second = pool.get("beta");
        let first_again = pool.get("alpha");

        assert!(Arc::ptr_eq(&first, &first_again));
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_pool_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "slow".to_string(),
            BucketSettings {
                max_tokens: 1.0,
                refill_rate: 0.5,
            },
        );
        let pool = RateLimiterPool::with_overrides(BucketSettings::default(), overrides);

        assert!((pool.get("slow").max_tokens() - 1.0).abs() < f64::EPSILON);
        assert!((pool.get("fast").max_tokens() - 5.0).abs() < f64::EPSILON);
    }
}

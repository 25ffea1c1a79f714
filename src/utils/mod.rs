//! Utility modules supporting the orchestration core.
//!
//! - [`TokenBucket`] / [`RateLimiterPool`]: per-provider token-bucket
//!   admission control
//! - [`merge_results`]: flatten and deduplicate per-provider result sets
//! - [`completeness_score`]: heuristic picking the surviving duplicate
//! - [`near_duplicate_pairs`]: diagnostic fuzzy-title duplicate detection

mod dedup;
mod limiter;

pub use dedup::{
    completeness_score, merge_results, near_duplicate_pairs, normalize_title, MergedResults,
};
pub use limiter::{BucketSettings, RateLimiterPool, TokenBucket};

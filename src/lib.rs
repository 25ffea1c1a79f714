//! # research-fanout
//!
//! Parallel search orchestration across unreliable, rate-limited research
//! data providers.
//!
//! A single logical query is fanned out to many independent providers,
//! executed under a configurable concurrency policy, retried according to
//! each provider's health record, and the heterogeneous result sets are
//! merged, deduplicated and summarized with run metrics.
//!
//! ## Architecture
//!
//! - [`models`]: Core data structures (Record, SearchQuery, etc.)
//! - [`providers`]: Provider plugins with extensible trait-based architecture
//! - [`orchestrator`]: Health monitor, scheduler, execution strategies,
//!   provider selection and metrics
//! - [`utils`]: Token-bucket rate limiting and result merging/deduplication
//! - [`config`]: Configuration management

pub mod config;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod utils;

// Re-export commonly used types
pub use config::OrchestratorConfig;
pub use models::{Record, SearchQuery};
pub use orchestrator::{Orchestrator, ParallelSearchConfig, SearchOutcome};
pub use providers::{Provider, ProviderRegistry};
pub use utils::merge_results;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

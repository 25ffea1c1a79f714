//! Search request and response models.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Search query parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Main search query string
    pub query: String,

    /// Maximum number of results to return per provider
    pub max_results: usize,

    /// Year filter (single year, range like "2018-2022", or "2010-" for from, "-2015" for until)
    pub year: Option<String>,

    /// Field-specific filters, passed through to provider adapters
    pub filters: HashMap<String, String>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            max_results: 10,
            year: None,
            filters: HashMap::new(),
        }
    }
}

impl SearchQuery {
    /// Create a new search query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Set maximum results
    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Set year filter
    pub fn year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }

    /// Add a filter
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }
}

/// Search response containing records and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Records found
    pub records: Vec<crate::models::Record>,

    /// Total number of results reported by the provider (may be more than returned)
    pub total_results: Option<usize>,

    /// Provider that produced the results
    pub provider: String,

    /// Query that was executed
    pub query: String,
}

impl SearchResponse {
    /// Create a new search response
    pub fn new(
        records: Vec<crate::models::Record>,
        provider: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            records,
            total_results: None,
            provider: provider.into(),
            query: query.into(),
        }
    }

    /// Set total results
    pub fn total_results(mut self, total: usize) -> Self {
        self.total_results = Some(total);
        self
    }

    /// Total reported by the provider, falling back to the returned count
    pub fn reported_total(&self) -> usize {
        self.total_results.unwrap_or(self.records.len())
    }
}

/// Result of probing a provider's availability
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Whether the provider answered the probe
    pub healthy: bool,

    /// Observed probe round-trip in milliseconds
    pub latency_ms: u64,
}

impl ProbeResult {
    /// A healthy probe observation
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            healthy: true,
            latency_ms,
        }
    }

    /// An unhealthy probe observation
    pub fn unhealthy(latency_ms: u64) -> Self {
        Self {
            healthy: false,
            latency_ms,
        }
    }
}

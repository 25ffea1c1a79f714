//! Provider plugins with extensible trait-based architecture.
//!
//! This module defines the [`Provider`] trait that all data providers
//! implement. A provider adapter is responsible for translating a
//! [`SearchQuery`] into whatever its upstream service expects and parsing
//! the response back into [`SearchResponse`]; the orchestration core only
//! depends on this trait, never on a concrete transport.
//!
//! New providers can be added by implementing this trait and registering
//! them with the [`ProviderRegistry`].

mod registry;

pub mod mock;

pub use mock::{ConcurrencyGauge, MockProvider};
pub use registry::{ProviderCapabilities, ProviderProfile, ProviderRegistry};

use std::sync::Arc;

use crate::models::{ProbeResult, SearchQuery, SearchResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The Provider trait defines the interface for all data provider plugins.
///
/// # Implementing a New Provider
///
/// 1. Create a struct that implements `Provider`
/// 2. Implement `id`, `name`, and `search`
/// 3. Implement `probe` if the upstream offers a cheap liveness check
/// 4. Register it with `ProviderRegistry::register`
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this provider (e.g., "openalex", "crossref")
    fn id(&self) -> &str;

    /// Human-readable name of this provider
    fn name(&self) -> &str;

    /// Describe the capabilities of this provider
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::SEARCH
    }

    /// Selection metadata (coverage categories, keywords, open-access flag)
    fn profile(&self) -> ProviderProfile {
        ProviderProfile::default()
    }

    /// Whether this provider supports search
    fn supports_search(&self) -> bool {
        self.capabilities().contains(ProviderCapabilities::SEARCH)
    }

    /// Whether this provider supports liveness probes
    fn supports_probe(&self) -> bool {
        self.capabilities().contains(ProviderCapabilities::PROBE)
    }

    /// Search for records matching the query
    async fn search(&self, _query: &SearchQuery) -> Result<SearchResponse, ProviderError> {
        Err(ProviderError::NotImplemented)
    }

    /// Probe the provider's availability
    async fn probe(&self) -> Result<ProbeResult, ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}

/// Errors that can occur when interacting with a provider
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The requested operation is not implemented for this provider
    #[error("Operation not implemented for this provider")]
    NotImplemented,

    /// The call exceeded its time budget
    #[error("Request timed out")]
    Timeout,

    /// Upstream rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Authentication or authorization failure
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Connection-level failure (DNS, refused, reset)
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Upstream returned a 5xx-equivalent error
    #[error("Server error: {0}")]
    Server(String),

    /// Parsing error (XML, JSON, HTML, etc.)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

/// Closed set of error categories used by retry and fallback policy.
///
/// Retry logic depends only on this tag, never on the shape of a concrete
/// transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    Connection,
    ServerError,
    AuthFailed,
    ParseError,
    Unknown,
}

impl ProviderError {
    /// Map this error to its category tag
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Timeout => ErrorKind::Timeout,
            ProviderError::RateLimited => ErrorKind::RateLimited,
            ProviderError::Connection(_) => ErrorKind::Connection,
            ProviderError::Server(_) => ErrorKind::ServerError,
            ProviderError::AuthFailed(_) => ErrorKind::AuthFailed,
            ProviderError::Parse(_) => ErrorKind::ParseError,
            ProviderError::NotImplemented
            | ProviderError::InvalidRequest(_)
            | ProviderError::Other(_) => ErrorKind::Unknown,
        }
    }
}

/// Pluggable function that maps a provider error to its category.
///
/// The default classifier is [`ProviderError::kind`]; callers embedding a
/// transport with richer error shapes can substitute their own mapping.
pub type ErrorClassifier = Arc<dyn Fn(&ProviderError) -> ErrorKind + Send + Sync>;

/// The default error classifier
pub fn default_classifier() -> ErrorClassifier {
    Arc::new(|err: &ProviderError| err.kind())
}

//! Registry for managing provider plugins.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Provider, ProviderError};

bitflags::bitflags! {
    /// Capabilities that a provider can support
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProviderCapabilities: u32 {
        const SEARCH = 1 << 0;
        const PROBE = 1 << 1;
    }
}

/// Static selection metadata describing what a provider covers.
///
/// The provider selector scores candidates against this profile; it carries
/// no runtime state (health statistics live in the health monitor).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Topic categories this provider covers (e.g., "computer-science")
    #[serde(default)]
    pub categories: Vec<String>,

    /// Specialty keywords this provider is strong on
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Whether the provider serves open-access content
    #[serde(default)]
    pub open_access: bool,
}

impl ProviderProfile {
    /// Create a profile covering the given categories
    pub fn new(categories: &[&str]) -> Self {
        Self {
            categories: categories.iter().map(|s| s.to_string()).collect(),
            keywords: Vec::new(),
            open_access: false,
        }
    }

    /// Set specialty keywords
    pub fn keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Mark the provider as open-access
    pub fn open_access(mut self, open_access: bool) -> Self {
        self.open_access = open_access;
        self
    }
}

/// Registry for all available providers
///
/// The ProviderRegistry manages provider plugins and provides methods to
/// query and use them. It is plain data owned by the caller; the
/// orchestrator borrows it per run.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a new provider
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    /// Get a provider by ID
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.get(id)
    }

    /// Get a provider by ID, returning an error if not found
    pub fn get_required(&self, id: &str) -> Result<&Arc<dyn Provider>, ProviderError> {
        self.get(id)
            .ok_or_else(|| ProviderError::InvalidRequest(format!("Provider '{}' not found", id)))
    }

    /// Get all registered providers
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.values()
    }

    /// Get all provider IDs
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(|s| s.as_str())
    }

    /// Get providers that support a specific capability
    pub fn with_capability(&self, capability: ProviderCapabilities) -> Vec<&Arc<dyn Provider>> {
        self.all()
            .filter(|p| p.capabilities().contains(capability))
            .collect()
    }

    /// Get providers that support search
    pub fn searchable(&self) -> Vec<&Arc<dyn Provider>> {
        self.with_capability(ProviderCapabilities::SEARCH)
    }

    /// Get providers that support liveness probes
    pub fn probeable(&self) -> Vec<&Arc<dyn Provider>> {
        self.with_capability(ProviderCapabilities::PROBE)
    }

    /// Check if a provider exists
    pub fn has(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Get the number of registered providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Resolve a list of provider ids, skipping unknown ones with a warning
    pub fn resolve(&self, ids: &[String]) -> Vec<Arc<dyn Provider>> {
        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(id) {
                Some(provider) => resolved.push(Arc::clone(provider)),
                None => tracing::warn!("Unknown provider '{}' skipped", id),
            }
        }
        resolved
    }
}

//! Record model representing a search result entity from any provider.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A bibliographic record returned by a provider adapter.
///
/// This struct provides a standardized format for results across all
/// providers. The orchestration core only looks at the identity fields
/// (DOI, title, authors) and the completeness signals (abstract, citations,
/// full text, keywords) when merging; everything else is passed through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Provider-specific external identifier
    pub record_id: String,

    /// Record title
    pub title: String,

    /// Authors (semicolon-separated)
    pub authors: String,

    /// Abstract text
    pub r#abstract: String,

    /// Digital Object Identifier
    pub doi: Option<String>,

    /// Record page URL
    pub url: String,

    /// Identifier of the provider that returned this record
    pub provider: String,

    /// Keywords (semicolon-separated)
    pub keywords: Option<String>,

    /// Citation count
    pub citations: Option<u32>,

    /// Whether full text is available for this record
    pub full_text_available: bool,

    /// Publication date (ISO format)
    pub published_date: Option<String>,

    /// Provider-specific metadata (flexible JSON)
    pub extra: Option<HashMap<String, serde_json::Value>>,
}

impl Record {
    /// Create a new record with required fields
    pub fn new(
        record_id: String,
        title: String,
        url: String,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            record_id,
            title,
            authors: String::new(),
            r#abstract: String::new(),
            doi: None,
            url,
            provider: provider.into(),
            keywords: None,
            citations: None,
            full_text_available: false,
            published_date: None,
            extra: None,
        }
    }

    /// Returns the primary identifier for this record (DOI if available, else record_id)
    pub fn primary_id(&self) -> &str {
        self.doi.as_deref().unwrap_or(&self.record_id)
    }

    /// Returns the author names as a vector
    pub fn author_list(&self) -> Vec<&str> {
        self.authors
            .split(';')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Returns the keywords as a vector
    pub fn keyword_list(&self) -> Vec<&str> {
        self.keywords
            .as_ref()
            .map(|k| k.split(';').map(|s| s.trim()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    /// First author, if any
    pub fn first_author(&self) -> Option<&str> {
        self.author_list().first().copied()
    }
}

/// Builder for constructing Record objects
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: Record,
}

impl RecordBuilder {
    /// Create a new builder with required fields
    pub fn new(
        record_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            record: Record::new(record_id.into(), title.into(), url.into(), provider),
        }
    }

    /// Set authors
    pub fn authors(mut self, authors: impl Into<String>) -> Self {
        self.record.authors = authors.into();
        self
    }

    /// Set abstract
    pub fn abstract_text(mut self, abstract_text: impl Into<String>) -> Self {
        self.record.r#abstract = abstract_text.into();
        self
    }

    /// Set DOI
    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        self.record.doi = Some(doi.into());
        self
    }

    /// Set keywords
    pub fn keywords(mut self, keywords: impl Into<String>) -> Self {
        self.record.keywords = Some(keywords.into());
        self
    }

    /// Set citation count
    pub fn citations(mut self, count: u32) -> Self {
        self.record.citations = Some(count);
        self
    }

    /// Mark full text as available
    pub fn full_text(mut self, available: bool) -> Self {
        self.record.full_text_available = available;
        self
    }

    /// Set publication date
    pub fn published_date(mut self, date: impl Into<String>) -> Self {
        self.record.published_date = Some(date.into());
        self
    }

    /// Add extra metadata
    pub fn extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.record
            .extra
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    /// Build the Record
    pub fn build(self) -> Record {
        self.record
    }
}

//! Topic classification and provider selection.
//!
//! Before scheduling, the selector classifies the query against a keyword
//! taxonomy and scores every known provider on coverage, reliability, speed
//! and specialty overlap. Both the taxonomy and the scoring weights are
//! injectable configuration, never embedded constants.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::SelectionConfig;
use crate::orchestrator::health::HealthMonitor;
use crate::providers::ProviderRegistry;

/// Keyword dictionary mapping category names to trigger keywords
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicTaxonomy {
    /// Category name → keywords that indicate it
    #[serde(default)]
    pub categories: HashMap<String, Vec<String>>,
}

impl TopicTaxonomy {
    /// An empty taxonomy
    pub fn empty() -> Self {
        Self::default()
    }

    /// Small built-in dictionary used as the out-of-the-box default.
    ///
    /// Deployments are expected to replace this with their own taxonomy via
    /// configuration.
    pub fn builtin() -> Self {
        let mut taxonomy = Self::default();
        taxonomy.insert(
            "computer-science",
            &[
                "machine learning",
                "deep learning",
                "neural network",
                "algorithm",
                "artificial intelligence",
                "computer vision",
                "natural language processing",
                "software",
            ],
        );
        taxonomy.insert(
            "biomedicine",
            &[
                "cancer", "diagnosis", "clinical", "genome", "protein", "disease", "drug",
                "patient", "medical",
            ],
        );
        taxonomy.insert(
            "physics",
            &[
                "quantum", "particle", "relativity", "photon", "cosmology", "superconductor",
            ],
        );
        taxonomy.insert(
            "economics",
            &["market", "monetary", "inflation", "labor", "trade", "investment"],
        );
        taxonomy
    }

    /// Add a category with its keywords
    pub fn insert(&mut self, category: impl Into<String>, keywords: &[&str]) {
        self.categories.insert(
            category.into(),
            keywords.iter().map(|s| s.to_string()).collect(),
        );
    }
}

/// One matched category with its keyword hit count
#[derive(Debug, Clone, Serialize)]
pub struct CategoryMatch {
    /// Category name
    pub category: String,
    /// Number of keywords from this category found in the query
    pub matches: usize,
}

/// Result of classifying a query against the taxonomy
#[derive(Debug, Clone, Serialize)]
pub struct TopicClassification {
    /// The classified query text
    pub query: String,
    /// Matched categories, sorted by hit count descending
    pub categories: Vec<CategoryMatch>,
    /// min(total matches / 3, 1.0), or 0.3 when nothing matched
    pub confidence: f64,
}

impl TopicClassification {
    /// Names of the matched categories
    pub fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.category.as_str()).collect()
    }
}

/// Check a keyword against the query on word boundaries
fn keyword_in_query(query_lower: &str, keyword: &str) -> bool {
    let keyword = keyword.to_lowercase();
    match Regex::new(&format!(r"\b{}\b", regex::escape(&keyword))) {
        Ok(re) => re.is_match(query_lower),
        Err(_) => query_lower.contains(&keyword),
    }
}

/// Classify a query's topic by keyword matching.
pub fn classify_topic(query: &str, taxonomy: &TopicTaxonomy) -> TopicClassification {
    let query_lower = query.to_lowercase();
    let mut categories: Vec<CategoryMatch> = Vec::new();
    let mut total_matches = 0usize;

    for (category, keywords) in &taxonomy.categories {
        let matches = keywords
            .iter()
            .filter(|kw| keyword_in_query(&query_lower, kw))
            .count();
        if matches > 0 {
            total_matches += matches;
            categories.push(CategoryMatch {
                category: category.clone(),
                matches,
            });
        }
    }

    categories.sort_by(|a, b| {
        b.matches
            .cmp(&a.matches)
            .then_with(|| a.category.cmp(&b.category))
    });

    let confidence = if total_matches == 0 {
        0.3
    } else {
        (total_matches as f64 / 3.0).min(1.0)
    };

    TopicClassification {
        query: query.to_string(),
        categories,
        confidence,
    }
}

/// Weighted-sum coefficients for provider scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight of the category-match ratio
    #[serde(default = "default_category_weight")]
    pub category: f64,

    /// Weight of the raw success rate
    #[serde(default = "default_reliability_weight")]
    pub reliability: f64,

    /// Weight of the response-time score
    #[serde(default = "default_speed_weight")]
    pub speed: f64,

    /// Weight of the specialty-keyword overlap ratio
    #[serde(default = "default_keyword_weight")]
    pub keyword: f64,

    /// Flat bonus for open-access providers when prioritized
    #[serde(default = "default_open_access_bonus")]
    pub open_access_bonus: f64,
}

fn default_category_weight() -> f64 {
    0.35
}

fn default_reliability_weight() -> f64 {
    0.3
}

fn default_speed_weight() -> f64 {
    0.2
}

fn default_keyword_weight() -> f64 {
    0.15
}

fn default_open_access_bonus() -> f64 {
    0.1
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            category: default_category_weight(),
            reliability: default_reliability_weight(),
            speed: default_speed_weight(),
            keyword: default_keyword_weight(),
            open_access_bonus: default_open_access_bonus(),
        }
    }
}

/// Score breakdown for one candidate provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderScore {
    /// Provider identifier
    pub provider_id: String,
    /// Weighted total
    pub score: f64,
    /// Share of the topic's categories this provider covers
    pub category_ratio: f64,
    /// Observed success rate
    pub success_rate: f64,
    /// Response-time score in [0.2, 1.0]
    pub speed_score: f64,
    /// Share of the provider's specialty keywords present in the query
    pub keyword_ratio: f64,
}

/// Outcome of provider selection for one query
#[derive(Debug, Clone, Serialize)]
pub struct SelectionOutcome {
    /// Selected provider ids, best first
    pub providers: Vec<String>,
    /// Human-readable justification per selected provider
    pub reasons: Vec<String>,
    /// Combined selection confidence
    pub confidence: f64,
    /// Broad-coverage providers to try when the selection fails
    pub fallback_providers: Vec<String>,
}

/// Response-time score: 1.0 at or under the target, linear decay to the
/// 0.2 floor at three times the target.
fn speed_score(latency_ms: f64, target_ms: f64) -> f64 {
    if target_ms <= 0.0 || latency_ms <= target_ms {
        1.0
    } else if latency_ms >= 3.0 * target_ms {
        0.2
    } else {
        1.0 - (latency_ms - target_ms) / (2.0 * target_ms) * 0.8
    }
}

/// Score all eligible providers for a classified topic.
///
/// Providers with an observed success rate below the configured minimum,
/// or with the sticky unhealthy flag set, are excluded up front. The rest
/// get a weighted sum of category coverage, success rate, speed and keyword
/// overlap, plus the open-access bonus when prioritized.
pub fn score_providers(
    topic: &TopicClassification,
    registry: &ProviderRegistry,
    health: &HealthMonitor,
    config: &SelectionConfig,
) -> Vec<ProviderScore> {
    let topic_categories = topic.category_names();
    let mut scores: Vec<ProviderScore> = Vec::new();

    for provider in registry.all() {
        let provider_id = provider.id().to_string();
        let record = health.health(&provider_id);
        let success_rate = record.as_ref().map(|r| r.success_rate).unwrap_or(1.0);
        let flag = record.as_ref().map(|r| r.is_healthy).unwrap_or(true);
        let latency_ms = record.as_ref().map(|r| r.average_latency_ms).unwrap_or(0.0);

        if !flag || success_rate < config.min_success_rate {
            tracing::debug!(
                "Provider {} excluded from selection (rate {:.2}, healthy {})",
                provider_id,
                success_rate,
                flag
            );
            continue;
        }

        let profile = provider.profile();

        let category_ratio = if topic_categories.is_empty() {
            0.0
        } else {
            let covered = profile
                .categories
                .iter()
                .filter(|c| topic_categories.contains(&c.as_str()))
                .count();
            covered as f64 / topic_categories.len() as f64
        };

        let keyword_ratio = if profile.keywords.is_empty() {
            0.0
        } else {
            let query_lower = topic.query.to_lowercase();
            let matched = profile
                .keywords
                .iter()
                .filter(|kw| keyword_in_query(&query_lower, kw))
                .count();
            matched as f64 / profile.keywords.len() as f64
        };

        let weights = &config.weights;
        let speed = speed_score(latency_ms, config.target_latency_ms);

        let mut score = weights.category * category_ratio
            + weights.reliability * success_rate
            + weights.speed * speed
            + weights.keyword * keyword_ratio;

        if config.prioritize_open_access && profile.open_access {
            score += weights.open_access_bonus;
        }

        scores.push(ProviderScore {
            provider_id,
            score,
            category_ratio,
            success_rate,
            speed_score: speed,
            keyword_ratio,
        });
    }

    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.provider_id.cmp(&b.provider_id))
    });
    scores
}

/// Classify the query, score all providers, and pick the candidate set.
pub fn select_providers(
    query: &str,
    registry: &ProviderRegistry,
    health: &HealthMonitor,
    config: &SelectionConfig,
) -> SelectionOutcome {
    let topic = classify_topic(query, &config.taxonomy);
    let scored = score_providers(&topic, registry, health, config);

    let selected: Vec<&ProviderScore> = scored.iter().take(config.max_selected).collect();

    let reasons = selected
        .iter()
        .map(|s| {
            format!(
                "{}: score {:.2} (category {:.2}, reliability {:.2}, speed {:.2}, keywords {:.2})",
                s.provider_id, s.score, s.category_ratio, s.success_rate, s.speed_score,
                s.keyword_ratio
            )
        })
        .collect();

    let mean_score = if selected.is_empty() {
        0.0
    } else {
        selected.iter().map(|s| s.score).sum::<f64>() / selected.len() as f64
    };
    let confidence = (mean_score + topic.confidence) / 2.0;

    let providers: Vec<String> = selected.iter().map(|s| s.provider_id.clone()).collect();

    let fallback_providers: Vec<String> = config
        .fallback_providers
        .iter()
        .filter(|id| registry.has(id) && !providers.contains(id))
        .cloned()
        .collect();

    SelectionOutcome {
        providers,
        reasons,
        confidence,
        fallback_providers,
    }
}

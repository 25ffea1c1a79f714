//! Merging and deduplication of per-provider result sets.
//!
//! Results from all successful provider calls are flattened into one list.
//! Duplicate entities are resolved by a completeness score so the richest
//! copy of a record survives, with ties keeping the first-seen copy.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use serde::Serialize;
use strsim::jaro_winkler;

use crate::models::Record;
use crate::orchestrator::SearchOutcome;

/// Outcome of merging per-provider results
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergedResults {
    /// Combined (and possibly deduplicated) records
    pub records: Vec<Record>,

    /// Total result count reported by each provider
    pub total_by_provider: HashMap<String, usize>,

    /// Number of records collapsed into a surviving duplicate
    pub duplicate_count: usize,
}

/// Merge records from all successful outcomes.
///
/// With deduplication disabled the concatenated list is returned as-is.
/// With it enabled, records sharing a dedup key are collapsed to the copy
/// with the highest [`completeness_score`]; the survivor keeps the position
/// of the first-seen copy, and score ties keep the first-seen copy itself.
pub fn merge_results(outcomes: &[SearchOutcome], enable_dedup: bool) -> MergedResults {
    let mut records: Vec<Record> = Vec::new();
    let mut total_by_provider: HashMap<String, usize> = HashMap::new();

    for outcome in outcomes {
        if let Ok(response) = &outcome.result {
            total_by_provider.insert(outcome.provider_id.clone(), response.reported_total());
            records.extend(response.records.iter().cloned());
        }
    }

    if !enable_dedup {
        return MergedResults {
            records,
            total_by_provider,
            duplicate_count: 0,
        };
    }

    let mut kept: Vec<Record> = Vec::with_capacity(records.len());
    let mut scores: Vec<f64> = Vec::with_capacity(records.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut duplicate_count = 0;

    for record in records {
        let score = completeness_score(&record);

        let Some(key) = dedup_key(&record) else {
            // No DOI and no usable title: nothing to collide on, keep as unique.
            kept.push(record);
            scores.push(score);
            continue;
        };

        match index.entry(key) {
            Entry::Occupied(entry) => {
                duplicate_count += 1;
                let pos = *entry.get();
                if score > scores[pos] {
                    kept[pos] = record;
                    scores[pos] = score;
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(kept.len());
                kept.push(record);
                scores.push(score);
            }
        }
    }

    if duplicate_count > 0 {
        tracing::debug!(
            "Deduplication collapsed {} of {} records",
            duplicate_count,
            kept.len() + duplicate_count
        );
    }

    MergedResults {
        records: kept,
        total_by_provider,
        duplicate_count,
    }
}

/// Completeness heuristic deciding which duplicate survives.
///
/// +10 DOI, +5 abstract, +3 citation count, +2 full text, +1 per author,
/// +0.5 per keyword.
pub fn completeness_score(record: &Record) -> f64 {
    let mut score = 0.0;

    if record.doi.as_deref().is_some_and(|d| !d.trim().is_empty()) {
        score += 10.0;
    }
    if !record.r#abstract.trim().is_empty() {
        score += 5.0;
    }
    if record.citations.is_some() {
        score += 3.0;
    }
    if record.full_text_available {
        score += 2.0;
    }
    score += record.author_list().len() as f64;
    score += record.keyword_list().len() as f64 * 0.5;

    score
}

/// Identity key for duplicate detection.
///
/// DOI (trimmed, lowercased) when present; otherwise normalized title plus
/// normalized first author. Returns `None` when neither identity is usable.
fn dedup_key(record: &Record) -> Option<String> {
    if let Some(doi) = &record.doi {
        let doi = doi.trim().to_lowercase();
        if !doi.is_empty() {
            return Some(format!("doi:{}", doi));
        }
    }

    let title = normalize_title(&record.title);
    if title.is_empty() {
        return None;
    }

    let author = record
        .first_author()
        .map(|a| a.trim().to_lowercase())
        .unwrap_or_default();

    Some(format!("title:{}|{}", title, author))
}

/// Normalize a title for comparison: lowercase, punctuation stripped,
/// whitespace collapsed.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find cross-provider record pairs whose titles are highly similar but
/// which survived exact-key deduplication.
///
/// Diagnostic only: pairs are reported, never merged, so the exact dedup
/// result is unaffected. A pair qualifies when the Jaro-Winkler similarity
/// of the lowercased titles is at least `threshold` and the records share
/// at least one author (records without author data are assumed to match).
pub fn near_duplicate_pairs(records: &[Record], threshold: f64) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();

    for i in 0..records.len() {
        for j in (i + 1)..records.len() {
            let a = &records[i];
            let b = &records[j];

            if a.provider == b.provider {
                continue;
            }

            let title_a = a.title.to_lowercase();
            let title_b = b.title.to_lowercase();
            if jaro_winkler(&title_a, &title_b) >= threshold && authors_overlap(a, b) {
                pairs.push((i, j));
            }
        }
    }

    pairs
}

/// Check if two records share at least one author
fn authors_overlap(a: &Record, b: &Record) -> bool {
    let authors_a: HashSet<String> = a
        .author_list()
        .iter()
        .map(|s| s.to_lowercase())
        .collect();
    let authors_b: HashSet<String> = b
        .author_list()
        .iter()
        .map(|s| s.to_lowercase())
        .collect();

    // If one has no authors, can't compare
    if authors_a.is_empty() || authors_b.is_empty() {
        return true;
    }

    authors_a.intersection(&authors_b).count() > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordBuilder, SearchResponse};
    use crate::orchestrator::SearchOutcome;
    use std::time::Duration;

    fn outcome_with(provider: &str, records: Vec<Record>) -> SearchOutcome {
        let response = SearchResponse::new(records, provider, "test");
        SearchOutcome::success(provider, response, Duration::from_millis(10))
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("Hello, World!"), "hello world");
        assert_eq!(normalize_title("Test   Title"), "test title");
        assert_eq!(normalize_title("Test: A-B/C"), "test abc");
        assert_eq!(normalize_title(""), "");
        assert_eq!(normalize_title("   "), "");
    }

    #[test]
    fn test_merge_without_dedup() {
        let outcomes = vec![
            outcome_with(
                "alpha",
                vec![
                    RecordBuilder::new("1", "Same Title", "http://a/1", "alpha")
                        .doi("10.1/x")
                        .build(),
                ],
            ),
            outcome_with(
                "beta",
                vec![
                    RecordBuilder::new("2", "Same Title", "http://b/2", "beta")
                        .doi("10.1/x")
                        .build(),
                ],
            ),
        ];

        let merged = merge_results(&outcomes, false);
        assert_eq!(merged.records.len(), 2);
        assert_eq!(merged.duplicate_count, 0);
        assert_eq!(merged.total_by_provider.get("alpha"), Some(&1));
    }

    #[test]
    fn test_dedup_by_doi_case_insensitive() {
        let outcomes = vec![
            outcome_with(
                "alpha",
                vec![
                    RecordBuilder::new("1", "A Title", "http://a/1", "alpha")
                        .doi("10.1234/TEST ")
                        .build(),
                ],
            ),
            outcome_with(
                "beta",
                vec![
                    RecordBuilder::new("2", "Another Rendering", "http://b/2", "beta")
                        .doi("10.1234/test")
                        .build(),
                ],
            ),
        ];

        let merged = merge_results(&outcomes, true);
        assert_eq!(merged.records.len(), 1);
        assert_eq!(merged.duplicate_count, 1);
    }

    #[test]
    fn test_dedup_higher_completeness_wins() {
        let sparse = RecordBuilder::new("1", "A Title", "http://a/1", "alpha")
            .doi("10.1/x")
            .build();
        let rich = RecordBuilder::new("2", "A Title", "http://b/2", "beta")
            .doi("10.1/x")
            .abstract_text("Full abstract text.")
            .authors("John Doe; Jane Smith")
            .citations(12)
            .full_text(true)
            .build();

        let outcomes = vec![
            outcome_with("alpha", vec![sparse]),
            outcome_with("beta", vec![rich]),
        ];

        let merged = merge_results(&outcomes, true);
        assert_eq!(merged.records.len(), 1);
        // The richer copy wins but keeps the first-seen position.
        assert_eq!(merged.records[0].record_id, "2");
    }

    #[test]
    fn test_dedup_tie_keeps_first_seen() {
        let first = RecordBuilder::new("1", "A Title", "http://a/1", "alpha")
            .doi("10.1/x")
            .build();
        let second = RecordBuilder::new("2", "A Title", "http://b/2", "beta")
            .doi("10.1/x")
            .build();

        let outcomes = vec![
            outcome_with("alpha", vec![first]),
            outcome_with("beta", vec![second]),
        ];

        let merged = merge_results(&outcomes, true);
        assert_eq!(merged.records.len(), 1);
        assert_eq!(merged.records[0].record_id, "1");
    }

    #[test]
    fn test_dedup_title_author_fallback() {
        let a = RecordBuilder::new("1", "Machine Learning for Cats!", "http://a/1", "alpha")
            .authors("John Doe")
            .build();
        let b = RecordBuilder::new("2", "machine learning for cats", "http://b/2", "beta")
            .authors("John Doe; Jane Smith")
            .build();

        let outcomes = vec![
            outcome_with("alpha", vec![a]),
            outcome_with("beta", vec![b]),
        ];

        let merged = merge_results(&outcomes, true);
        assert_eq!(merged.records.len(), 1);
        assert_eq!(merged.duplicate_count, 1);
        // The second copy has more authors, hence the higher score.
        assert_eq!(merged.records[0].record_id, "2");
    }

    #[test]
    fn test_no_dedup_across_different_first_authors() {
        let a = RecordBuilder::new("1", "Shared Title", "http://a/1", "alpha")
            .authors("John Doe")
            .build();
        let b = RecordBuilder::new("2", "Shared Title", "http://b/2", "beta")
            .authors("Jane Smith")
            .build();

        let outcomes = vec![
            outcome_with("alpha", vec![a]),
            outcome_with("beta", vec![b]),
        ];

        let merged = merge_results(&outcomes, true);
        assert_eq!(merged.records.len(), 2);
        assert_eq!(merged.duplicate_count, 0);
    }

    #[test]
    fn test_keyless_records_kept() {
        let a = Record::new("1".into(), "".into(), "http://a/1".into(), "alpha");
        let b = Record::new("2".into(), "  ".into(), "http://b/2".into(), "beta");

        let outcomes = vec![
            outcome_with("alpha", vec![a]),
            outcome_with("beta", vec![b]),
        ];

        let merged = merge_results(&outcomes, true);
        assert_eq!(merged.records.len(), 2);
    }

    #[test]
    fn test_failed_outcomes_excluded() {
        use crate::providers::ProviderError;

        let ok = outcome_with(
            "alpha",
            vec![RecordBuilder::new("1", "Title", "http://a/1", "alpha").build()],
        );
        let failed = SearchOutcome::failure(
            "beta",
            ProviderError::Timeout,
            Duration::from_millis(5),
        );

        let merged = merge_results(&[ok, failed], true);
        assert_eq!(merged.records.len(), 1);
        assert!(!merged.total_by_provider.contains_key("beta"));
    }

    #[test]
    fn test_completeness_score() {
        let rich = RecordBuilder::new("1", "T", "http://a/1", "alpha")
            .doi("10.1/x")
            .abstract_text("abstract")
            .citations(3)
            .full_text(true)
            .authors("A; B; C")
            .keywords("k1; k2")
            .build();

        // 10 + 5 + 3 + 2 + 3*1 + 2*0.5
        assert!((completeness_score(&rich) - 24.0).abs() < f64::EPSILON);

        let bare = Record::new("2".into(), "T".into(), "http://a/2".into(), "alpha");
        assert!((completeness_score(&bare)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_near_duplicate_pairs() {
        let records = vec![
            RecordBuilder::new("1", "Deep Learning for Cat Detection", "http://a/1", "alpha")
                .authors("John Doe")
                .build(),
            RecordBuilder::new("2", "Deep Learning for Cat Detectors", "http://b/2", "beta")
                .authors("John Doe")
                .build(),
            RecordBuilder::new("3", "Quantum Chemistry Basics", "http://c/3", "gamma")
                .authors("Jane Smith")
                .build(),
        ];

        let pairs = near_duplicate_pairs(&records, 0.95);
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn test_near_duplicates_skip_same_provider() {
        let records = vec![
            RecordBuilder::new("1", "Same Title", "http://a/1", "alpha").build(),
            RecordBuilder::new("2", "Same Title", "http://a/2", "alpha").build(),
        ];

        assert!(near_duplicate_pairs(&records, 0.95).is_empty());
    }
}

//! Keyword search against curated keyword lists.
//!
//! Scoring is plain substring containment with no stemming or synonyms:
//! a query term matches a record if it occurs inside any of the record's
//! keywords (case-insensitive). The score is the fraction of query terms
//! that match.

use quarry_core::{CatalogStore, KeywordCandidate, RecordKey, Result, SearchFilters};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Terms shorter than this (in characters) are ignored.
pub const MIN_TERM_CHARS: usize = 3;

/// A record matched by keyword search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordHit {
    /// Record identifier.
    pub id: String,
    /// Grouping key.
    pub key: RecordKey,
    /// Fraction of query terms matched, in `(0, 1]`.
    pub score: f32,
}

/// Split a query into lowercase terms of at least [`MIN_TERM_CHARS`].
pub fn tokenize_query(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|term| term.chars().count() >= MIN_TERM_CHARS)
        .collect()
}

/// Fraction of `terms` contained in at least one of `keywords`.
///
/// Returns 0 when `terms` is empty.
pub fn keyword_score(terms: &[String], keywords: &[String]) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let matched = terms
        .iter()
        .filter(|term| lowered.iter().any(|kw| kw.contains(term.as_str())))
        .count();
    matched as f32 / terms.len() as f32
}

/// Score candidates, keep positive scores, sort descending, truncate.
pub fn rank_candidates(
    terms: &[String],
    candidates: Vec<KeywordCandidate>,
    limit: usize,
) -> Vec<KeywordHit> {
    let mut hits: Vec<KeywordHit> = candidates
        .into_iter()
        .filter_map(|c| {
            let score = keyword_score(terms, &c.keywords);
            (score > 0.0).then_some(KeywordHit {
                id: c.id,
                key: c.key,
                score,
            })
        })
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    hits.truncate(limit);
    hits
}

/// Keyword search over a catalog store.
pub struct KeywordSearch {
    store: Arc<dyn CatalogStore>,
}

impl KeywordSearch {
    /// Create a keyword search over `store`.
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Rank records by keyword overlap with `query`.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<KeywordHit>> {
        let terms = tokenize_query(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let candidates = self.store.keyword_candidates(filters).await?;
        let hits = rank_candidates(&terms, candidates, limit);
        log::debug!("Keyword search matched {} records for {:?}", hits.len(), terms);
        Ok(hits)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use quarry_core::{CatalogRecord, MemoryCatalogStore};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn candidate(id: &str, keywords: &[&str]) -> KeywordCandidate {
        KeywordCandidate {
            id: id.to_string(),
            key: RecordKey::new(id, "program"),
            keywords: strings(keywords),
        }
    }

    #[test]
    fn test_tokenize_drops_short_terms() {
        assert_eq!(
            tokenize_query("MIT computer science AI research"),
            strings(&["mit", "computer", "science", "research"])
        );
        assert!(tokenize_query("ai of an").is_empty());
        assert!(tokenize_query("").is_empty());
    }

    #[test]
    fn test_score_is_fraction_of_terms() {
        let terms = strings(&["computer", "science", "research", "mit"]);
        let keywords = strings(&["Computer Science", "artificial intelligence"]);
        assert_eq!(keyword_score(&terms, &keywords), 0.5);
    }

    #[test]
    fn test_score_uses_substring_containment() {
        let terms = strings(&["intel"]);
        assert_eq!(keyword_score(&terms, &strings(&["artificial intelligence"])), 1.0);
        // Keyword inside the term is not a match.
        let terms = strings(&["biology"]);
        assert_eq!(keyword_score(&terms, &strings(&["bio"])), 0.0);
    }

    #[test]
    fn test_score_empty_inputs() {
        assert_eq!(keyword_score(&[], &strings(&["x"])), 0.0);
        assert_eq!(keyword_score(&strings(&["abc"]), &[]), 0.0);
    }

    #[test]
    fn test_rank_sorts_filters_and_truncates() {
        let terms = strings(&["robotics", "research"]);
        let candidates = vec![
            candidate("a", &["robotics lab"]),
            candidate("b", &["robotics", "research"]),
            candidate("c", &["poetry"]),
            candidate("d", &["undergraduate research"]),
        ];
        let hits = rank_candidates(&terms, candidates, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "b");
        assert_eq!(hits[0].score, 1.0);
        // a and d tie at 0.5; id breaks the tie.
        assert_eq!(hits[1].id, "a");
    }

    #[tokio::test]
    async fn test_search_over_store_with_filters() {
        let store = Arc::new(MemoryCatalogStore::with_records(vec![
            CatalogRecord::new("1", "MIT", "CS")
                .with_category("engineering")
                .with_keywords(["computer science", "artificial intelligence"]),
            CatalogRecord::new("2", "RISD", "Art")
                .with_category("arts")
                .with_keywords(["computer graphics"]),
        ]));
        let search = KeywordSearch::new(store);

        let all = search
            .search("computer", 10, &SearchFilters::none())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let arts = search
            .search("computer", 10, &SearchFilters::none().with_category("arts"))
            .await
            .unwrap();
        assert_eq!(arts.len(), 1);
        assert_eq!(arts[0].id, "2");

        assert!(search.search("ai", 10, &SearchFilters::none()).await.unwrap().is_empty());
    }
}

//! Hybrid search combining vector and keyword search results.
//!
//! Implements weighted score fusion for merging the two result lists.
//!
//! # Algorithm
//!
//! For every id in the union of both lists:
//!
//! - `semantic_score` / `keyword_score` default to 0 when the id is absent
//!   from the respective list
//! - the id is dropped unless at least one score meets its minimum
//! - `combined = semantic_score * semantic_weight + keyword_score * keyword_weight`
//! - `match_type` is `both` when both minimums are met, otherwise whichever was
//!
//! Results are sorted by `combined` (descending) and truncated to `limit`.
//! Both sub-searches over-fetch so that fusion happens before truncation.

use quarry_core::{Error, MatchType, RecordKey, Result, SearchFilters, SearchResult};
use quarry_vector::{SemanticHit, VectorSearch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::SearchConfig;
use crate::keyword::{KeywordHit, KeywordSearch};

/// Reject weight pairs outside `[0, 1]` or not summing to 1 within `tolerance`.
pub fn validate_weights(semantic_weight: f32, keyword_weight: f32, tolerance: f32) -> Result<()> {
    for (name, w) in [("semantic", semantic_weight), ("keyword", keyword_weight)] {
        if !(0.0..=1.0).contains(&w) {
            return Err(Error::validation(format!(
                "{name} weight {w} must be in [0, 1]"
            )));
        }
    }
    let sum = semantic_weight + keyword_weight;
    if (sum - 1.0).abs() > tolerance {
        return Err(Error::validation(format!(
            "weights must sum to 1.0 (got {semantic_weight} + {keyword_weight} = {sum})"
        )));
    }
    Ok(())
}

/// Options for one hybrid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridOptions {
    /// Maximum results.
    pub limit: usize,
    /// Weight of the semantic score.
    pub semantic_weight: f32,
    /// Weight of the keyword score.
    pub keyword_weight: f32,
    /// Minimum semantic score for a semantic match.
    pub min_semantic_score: f32,
    /// Minimum keyword score for a keyword match.
    pub min_keyword_score: f32,
    /// Record filters applied to both sub-searches.
    #[serde(default)]
    pub filters: SearchFilters,
}

impl HybridOptions {
    /// Options from configured defaults.
    pub fn from_config(config: &SearchConfig, limit: usize) -> Self {
        Self {
            limit,
            semantic_weight: config.semantic_weight,
            keyword_weight: config.keyword_weight,
            min_semantic_score: config.min_semantic_score,
            min_keyword_score: config.min_keyword_score,
            filters: SearchFilters::none(),
        }
    }

    /// Set the weight pair.
    pub fn with_weights(mut self, semantic: f32, keyword: f32) -> Self {
        self.semantic_weight = semantic;
        self.keyword_weight = keyword;
        self
    }

    /// Set the minimum scores.
    pub fn with_minimums(mut self, semantic: f32, keyword: f32) -> Self {
        self.min_semantic_score = semantic;
        self.min_keyword_score = keyword;
        self
    }

    /// Set record filters.
    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }
}

impl Default for HybridOptions {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default(), SearchConfig::default().default_limit)
    }
}

#[derive(Debug)]
struct Fused {
    key: RecordKey,
    semantic: Option<f32>,
    keyword: Option<f32>,
}

/// Merge semantic and keyword hits by weighted score.
///
/// An id absent from a list does not meet that list's minimum, even when
/// the minimum is 0.
pub fn fuse_scores(
    semantic_hits: &[SemanticHit],
    keyword_hits: &[KeywordHit],
    options: &HybridOptions,
) -> Vec<SearchResult> {
    let mut union: BTreeMap<&str, Fused> = BTreeMap::new();

    for hit in semantic_hits {
        union
            .entry(hit.id.as_str())
            .or_insert_with(|| Fused {
                key: hit.key.clone(),
                semantic: None,
                keyword: None,
            })
            .semantic = Some(hit.similarity);
    }
    for hit in keyword_hits {
        union
            .entry(hit.id.as_str())
            .or_insert_with(|| Fused {
                key: hit.key.clone(),
                semantic: None,
                keyword: None,
            })
            .keyword = Some(hit.score);
    }

    let mut results: Vec<SearchResult> = union
        .into_iter()
        .filter_map(|(id, fused)| {
            let semantic_ok = fused
                .semantic
                .is_some_and(|s| s >= options.min_semantic_score);
            let keyword_ok = fused
                .keyword
                .is_some_and(|k| k >= options.min_keyword_score);

            let match_type = match (semantic_ok, keyword_ok) {
                (true, true) => MatchType::Both,
                (true, false) => MatchType::Semantic,
                (false, true) => MatchType::Keyword,
                (false, false) => return None,
            };

            let semantic_score = fused.semantic.unwrap_or(0.0);
            let keyword_score = fused.keyword.unwrap_or(0.0);
            Some(SearchResult {
                id: id.to_string(),
                key: fused.key,
                semantic_score,
                keyword_score,
                combined_score: semantic_score * options.semantic_weight
                    + keyword_score * options.keyword_weight,
                match_type,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.combined_score
            .total_cmp(&a.combined_score)
            .then_with(|| a.id.cmp(&b.id))
    });
    results.truncate(options.limit);
    results
}

/// Fused results of one hybrid search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HybridMatches {
    /// Ranked results, best first.
    pub results: Vec<SearchResult>,
    /// Whether the query embedding came from cache.
    pub cache_hit: bool,
}

/// Runs vector and keyword search concurrently and fuses the results.
pub struct HybridRanker {
    vector: Arc<VectorSearch>,
    keyword: Arc<KeywordSearch>,
    config: SearchConfig,
}

impl HybridRanker {
    /// Create a ranker after validating `config`.
    pub fn new(
        vector: Arc<VectorSearch>,
        keyword: Arc<KeywordSearch>,
        config: SearchConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            vector,
            keyword,
            config,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Weighted fusion of semantic and keyword search.
    ///
    /// Fails with `Validation` before any external call when the weights are
    /// out of range or do not sum to 1 within the configured tolerance.
    pub async fn hybrid_search(&self, query: &str, options: &HybridOptions) -> Result<HybridMatches> {
        validate_weights(
            options.semantic_weight,
            options.keyword_weight,
            self.config.weight_tolerance,
        )?;
        if options.limit == 0 {
            return Ok(HybridMatches::default());
        }

        let fetch = options.limit.saturating_mul(self.config.over_fetch_factor);

        // Sub-search thresholds are 0; minimums apply during fusion.
        let (semantic, keyword) = tokio::join!(
            self.vector
                .semantic_search(query, fetch, &options.filters, 0.0),
            self.keyword.search(query, fetch, &options.filters),
        );
        let semantic = semantic?;
        let keyword = keyword?;

        let results = fuse_scores(&semantic.hits, &keyword, options);
        log::debug!(
            "Hybrid search fused {} semantic + {} keyword hits into {} results",
            semantic.hits.len(),
            keyword.len(),
            results.len()
        );
        Ok(HybridMatches {
            results,
            cache_hit: semantic.cache_hit,
        })
    }

    /// General-purpose entry point: hybrid search with the configured
    /// default weights (0.7 semantic / 0.3 keyword unless overridden).
    ///
    /// Pure semantic search under-serves exact proper nouns and acronyms;
    /// pure keyword search misses paraphrase.
    pub async fn smart_search(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<HybridMatches> {
        let options = HybridOptions::from_config(&self.config, limit).with_filters(filters.clone());
        self.hybrid_search(query, &options).await
    }
}

// ============================================================================
// Tests
// ============================================================================

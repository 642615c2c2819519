//! Search defaults.

use quarry_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Search configuration: thresholds, fusion weights, and over-fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Result limit when the caller gives none.
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Similarity floor for pure semantic search.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// Semantic weight used by `smart_search`.
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    /// Keyword weight used by `smart_search`.
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,

    /// Allowed deviation of `semantic_weight + keyword_weight` from 1.
    #[serde(default = "default_weight_tolerance")]
    pub weight_tolerance: f32,

    /// Minimum semantic score for a hybrid result to count as a semantic match.
    #[serde(default = "default_min_semantic_score")]
    pub min_semantic_score: f32,

    /// Minimum keyword score for a hybrid result to count as a keyword match.
    #[serde(default = "default_min_keyword_score")]
    pub min_keyword_score: f32,

    /// Hybrid sub-searches fetch `limit * over_fetch_factor` candidates.
    #[serde(default = "default_over_fetch_factor")]
    pub over_fetch_factor: usize,
}

fn default_limit() -> usize {
    10
}

fn default_min_similarity() -> f32 {
    0.5
}

fn default_semantic_weight() -> f32 {
    0.7
}

fn default_keyword_weight() -> f32 {
    0.3
}

fn default_weight_tolerance() -> f32 {
    0.01
}

fn default_min_semantic_score() -> f32 {
    0.5
}

fn default_min_keyword_score() -> f32 {
    0.1
}

fn default_over_fetch_factor() -> usize {
    2
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            min_similarity: default_min_similarity(),
            semantic_weight: default_semantic_weight(),
            keyword_weight: default_keyword_weight(),
            weight_tolerance: default_weight_tolerance(),
            min_semantic_score: default_min_semantic_score(),
            min_keyword_score: default_min_keyword_score(),
            over_fetch_factor: default_over_fetch_factor(),
        }
    }
}

impl SearchConfig {
    /// Check field ranges, including the default weight pair.
    pub fn validate(&self) -> Result<()> {
        if self.default_limit == 0 {
            return Err(Error::config("search.default_limit must be > 0"));
        }
        if self.over_fetch_factor == 0 {
            return Err(Error::config("search.over_fetch_factor must be > 0"));
        }
        for (name, value) in [
            ("min_similarity", self.min_similarity),
            ("min_semantic_score", self.min_semantic_score),
            ("min_keyword_score", self.min_keyword_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::config(format!("search.{name} must be in [0, 1]")));
            }
        }
        if !(0.0..0.5).contains(&self.weight_tolerance) {
            return Err(Error::config("search.weight_tolerance must be in [0, 0.5)"));
        }
        crate::hybrid::validate_weights(
            self.semantic_weight,
            self.keyword_weight,
            self.weight_tolerance,
        )
        .map_err(|e| Error::config(e.to_string()))
    }
}

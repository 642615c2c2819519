//! Keyword search and hybrid ranking for Quarry.
//!
//! - [`keyword`]: substring-overlap scoring against curated keyword lists
//! - [`hybrid`]: weighted fusion of semantic and keyword results
//! - [`config`]: `SearchConfig` thresholds and default weights

pub mod config;
pub mod hybrid;
pub mod keyword;

pub use config::SearchConfig;
pub use hybrid::{HybridMatches, HybridOptions, HybridRanker, fuse_scores, validate_weights};
pub use keyword::{KeywordHit, KeywordSearch, keyword_score, rank_candidates, tokenize_query};

//! Embedding generation, caching, and vector search for Quarry.
//!
//! # Modules
//!
//! - [`config`]: `EmbeddingConfig` and `CacheConfig`
//! - [`embedding`]: `EmbeddingProvider` trait and `MockEmbeddingProvider`
//! - [`openai`]: OpenAI-compatible HTTP provider
//! - [`generator`]: Shape-validating, time-bounded `EmbeddingGenerator`
//! - [`cache`]: Two-tier `EmbeddingCache` (local LRU + persistent store)
//! - [`search`]: `VectorSearch` (`semantic_search`, `find_similar`)

pub mod cache;
pub mod config;
pub mod embedding;
pub mod generator;
pub mod openai;
pub mod search;

use quarry_core::{Error, Result};
use std::sync::Arc;

pub use cache::{CacheClearReport, CacheSource, EmbeddingCache};
pub use config::{CacheConfig, EmbeddingConfig};
pub use embedding::{EmbeddingProvider, MockEmbeddingProvider};
pub use generator::EmbeddingGenerator;
pub use openai::OpenAiEmbeddingProvider;
pub use search::{SemanticHit, SemanticMatches, VectorSearch, distance_to_similarity};

/// Build the provider named by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    config.validate()?;
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbeddingProvider::new(config)?)),
        "mock" => Ok(Arc::new(
            MockEmbeddingProvider::new(config.dimension).with_max_batch_size(config.max_batch_size),
        )),
        other => Err(Error::config(format!("unknown embedding provider '{other}'"))),
    }
}

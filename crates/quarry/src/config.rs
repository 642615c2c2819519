//! Top-level service configuration.

use quarry_core::Result;
use quarry_index::IndexConfig;
use quarry_metrics::MetricsConfig;
use quarry_pipeline::PipelineConfig;
use quarry_search::SearchConfig;
use quarry_storage::StoreConfig;
use quarry_vector::{CacheConfig, EmbeddingConfig};
use serde::{Deserialize, Serialize};

/// Every component configuration, one section each.
///
/// Every field has a serde default, so an empty TOML document is a valid
/// configuration (in-memory store, OpenAI provider).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuarryConfig {
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Embedding cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Batch pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Search thresholds and weights.
    #[serde(default)]
    pub search: SearchConfig,

    /// Approximate index settings.
    #[serde(default)]
    pub index: IndexConfig,

    /// Metrics buffer settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Store and cache connections.
    #[serde(default)]
    pub store: StoreConfig,
}

impl QuarryConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.embedding.validate()?;
        self.cache.validate()?;
        self.pipeline.validate()?;
        self.search.validate()?;
        self.index.validate()?;
        self.metrics.validate()?;
        self.store.validate()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config: QuarryConfig = toml::from_str("").unwrap();
        assert_eq!(config, QuarryConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let config: QuarryConfig = toml::from_str(
            r#"
            [embedding]
            provider = "mock"
            dimension = 64

            [search]
            semantic_weight = 0.6
            keyword_weight = 0.4
            "#,
        )
        .unwrap();
        assert_eq!(config.embedding.dimension, 64);
        assert_eq!(config.embedding.max_batch_size, 100);
        assert_eq!(config.search.semantic_weight, 0.6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_section_fails_validation() {
        let config: QuarryConfig = toml::from_str(
            r#"
            [search]
            semantic_weight = 0.9
            keyword_weight = 0.3
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}

//! The `Quarry` service container.
//!
//! Wires the store, provider, cache, search, pipeline, index manager, and
//! metrics recorder together and exposes the Read API and the Operational
//! API. Every component is injected explicitly; nothing is global.

use quarry_core::{
    CatalogStore, MemoryCatalogStore, MetricSample, OperationKind, PersistentCache, Result,
    SearchFilters, SearchOutcome, SearchResult,
};
use quarry_index::{HealthReport, IndexBackend, IndexLifecycleManager, MemoryIndexBackend};
use quarry_metrics::MetricsRecorder;
use quarry_pipeline::{BatchEmbeddingPipeline, BatchReport, PipelineStats, Selector};
use quarry_search::{HybridOptions, HybridRanker, KeywordHit, KeywordSearch};
use quarry_storage::{PgCatalogStore, RedisPersistentCache};
use quarry_vector::{
    CacheClearReport, EmbeddingCache, EmbeddingGenerator, EmbeddingProvider, SemanticHit,
    VectorSearch, create_provider,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::QuarryConfig;

/// External collaborators handed to [`Quarry::from_components`].
pub struct Components {
    /// Catalog record store.
    pub store: Arc<dyn CatalogStore>,
    /// Embedding provider.
    pub provider: Arc<dyn EmbeddingProvider>,
    /// Approximate index backend.
    pub index_backend: Arc<dyn IndexBackend>,
    /// Shared persistent cache tier; `None` runs the cache local-only.
    pub persistent_cache: Option<Arc<dyn PersistentCache>>,
}

impl Components {
    /// In-memory store and index backend around `provider`.
    pub fn in_memory(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store: Arc::new(MemoryCatalogStore::new()),
            provider,
            index_backend: Arc::new(MemoryIndexBackend::new()),
            persistent_cache: None,
        }
    }

    /// Replace the store.
    pub fn with_store(mut self, store: Arc<dyn CatalogStore>) -> Self {
        self.store = store;
        self
    }

    /// Attach a persistent cache tier.
    pub fn with_persistent_cache(mut self, cache: Arc<dyn PersistentCache>) -> Self {
        self.persistent_cache = Some(cache);
        self
    }

    /// Replace the index backend.
    pub fn with_index_backend(mut self, backend: Arc<dyn IndexBackend>) -> Self {
        self.index_backend = backend;
        self
    }
}

/// Embedding coverage plus cache occupancy, flat for health endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingStats {
    /// Total records.
    pub total: usize,
    /// Records with an embedding.
    pub with_embedding: usize,
    /// Records still missing one.
    pub pending: usize,
    /// Coverage percentage.
    pub percent_complete: f64,
    /// Entries in the process-local cache tier.
    pub local_cache_entries: usize,
    /// Provider name.
    pub provider: String,
    /// Model tag prefixing cache keys.
    pub model_tag: String,
}

/// Hybrid semantic/keyword retrieval service.
pub struct Quarry {
    config: QuarryConfig,
    store: Arc<dyn CatalogStore>,
    metrics: Arc<MetricsRecorder>,
    cache: Arc<EmbeddingCache>,
    vector: Arc<VectorSearch>,
    keyword: Arc<KeywordSearch>,
    ranker: HybridRanker,
    pipeline: BatchEmbeddingPipeline,
    index: IndexLifecycleManager,
}

impl Quarry {
    /// Open connections named by `config.store` and build the service.
    ///
    /// Without a `database_url` the in-memory store and index backend are
    /// used. A Redis connection failure degrades the cache to local-only.
    pub async fn connect(config: QuarryConfig) -> Result<Self> {
        config.validate()?;
        let provider = create_provider(&config.embedding)?;

        let (store, index_backend): (Arc<dyn CatalogStore>, Arc<dyn IndexBackend>) =
            if config.store.database_url.is_some() {
                let pg = PgCatalogStore::connect(&config.store).await?;
                pg.migrate(config.embedding.dimension).await?;
                let backend: Arc<dyn IndexBackend> = Arc::new(pg.index_backend());
                let store: Arc<dyn CatalogStore> = Arc::new(pg);
                (store, backend)
            } else {
                log::warn!("No store.database_url configured; using the in-memory catalog store");
                let store: Arc<dyn CatalogStore> = Arc::new(MemoryCatalogStore::new());
                let backend: Arc<dyn IndexBackend> = Arc::new(MemoryIndexBackend::new());
                (store, backend)
            };

        let persistent_cache: Option<Arc<dyn PersistentCache>> =
            if config.store.redis_url.is_some() {
                match RedisPersistentCache::connect(&config.store).await {
                    Ok(cache) => Some(Arc::new(cache) as Arc<dyn PersistentCache>),
                    Err(e) => {
                        log::warn!("Persistent cache unavailable, running local-only: {e}");
                        None
                    }
                }
            } else {
                None
            };

        Self::from_components(
            config,
            Components {
                store,
                provider,
                index_backend,
                persistent_cache,
            },
        )
    }

    /// Build the service around explicitly supplied collaborators.
    pub fn from_components(config: QuarryConfig, components: Components) -> Result<Self> {
        config.validate()?;
        let Components {
            store,
            provider,
            index_backend,
            persistent_cache,
        } = components;

        let metrics = Arc::new(MetricsRecorder::new(config.metrics.clone())?);
        let generator = Arc::new(EmbeddingGenerator::new(provider, &config.embedding)?);

        let mut cache = EmbeddingCache::new(
            Arc::clone(&generator),
            config.embedding.model_tag.clone(),
            config.cache.clone(),
        )?
        .with_metrics(metrics.clone());
        if let Some(persistent) = persistent_cache {
            cache = cache.with_persistent(persistent);
        }
        let cache = Arc::new(cache);

        let vector = Arc::new(VectorSearch::new(Arc::clone(&store), Arc::clone(&cache)));
        let keyword = Arc::new(KeywordSearch::new(Arc::clone(&store)));
        let ranker = HybridRanker::new(
            Arc::clone(&vector),
            Arc::clone(&keyword),
            config.search.clone(),
        )?;
        let pipeline =
            BatchEmbeddingPipeline::new(Arc::clone(&store), generator, config.pipeline.clone())?
                .with_metrics(metrics.clone());
        let index = IndexLifecycleManager::new(index_backend, config.index.clone())?;

        log::info!(
            "Quarry ready (store: {}, provider: {}, dimension: {})",
            store.name(),
            cache.generator().provider_name(),
            config.embedding.dimension
        );
        Ok(Self {
            config,
            store,
            metrics,
            cache,
            vector,
            keyword,
            ranker,
            pipeline,
            index,
        })
    }

    /// Release store connections.
    pub async fn shutdown(self) {
        self.store.close().await;
        log::info!("Quarry shut down");
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Active configuration.
    pub fn config(&self) -> &QuarryConfig {
        &self.config
    }

    /// The catalog store.
    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    /// The metrics recorder.
    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    /// The embedding cache.
    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// The batch embedding pipeline.
    pub fn pipeline(&self) -> &BatchEmbeddingPipeline {
        &self.pipeline
    }

    /// The index lifecycle manager.
    pub fn index(&self) -> &IndexLifecycleManager {
        &self.index
    }

    // ------------------------------------------------------------------------
    // Read API
    // ------------------------------------------------------------------------

    /// Vector similarity search. `min_similarity` defaults to
    /// `search.min_similarity`.
    pub async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
        min_similarity: Option<f32>,
    ) -> Result<SearchOutcome<SemanticHit>> {
        let started = Instant::now();
        let min_similarity = min_similarity.unwrap_or(self.config.search.min_similarity);
        let matches = self
            .vector
            .semantic_search(query, limit, filters, min_similarity)
            .await?;
        self.finish(
            OperationKind::SemanticSearch,
            started,
            query,
            matches.cache_hit,
            matches.hits,
        )
    }

    /// Keyword-only search over curated keyword lists.
    pub async fn keyword_search(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<SearchOutcome<KeywordHit>> {
        let started = Instant::now();
        let hits = self.keyword.search(query, limit, filters).await?;
        self.finish(OperationKind::KeywordSearch, started, query, false, hits)
    }

    /// Weighted fusion of semantic and keyword search.
    pub async fn hybrid_search(
        &self,
        query: &str,
        options: &HybridOptions,
    ) -> Result<SearchOutcome<SearchResult>> {
        let started = Instant::now();
        let matches = self.ranker.hybrid_search(query, options).await?;
        self.finish(
            OperationKind::HybridSearch,
            started,
            query,
            matches.cache_hit,
            matches.results,
        )
    }

    /// Hybrid search with the configured default weights.
    pub async fn smart_search(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<SearchOutcome<SearchResult>> {
        let started = Instant::now();
        let matches = self.ranker.smart_search(query, limit, filters).await?;
        self.finish(
            OperationKind::HybridSearch,
            started,
            query,
            matches.cache_hit,
            matches.results,
        )
    }

    /// Records most similar to `record_id`, excluding itself.
    pub async fn find_similar(
        &self,
        record_id: &str,
        limit: usize,
    ) -> Result<SearchOutcome<SemanticHit>> {
        let started = Instant::now();
        let hits = self.vector.find_similar(record_id, limit).await?;
        self.finish(OperationKind::FindSimilar, started, record_id, false, hits)
    }

    fn finish<T>(
        &self,
        operation: OperationKind,
        started: Instant,
        query: &str,
        cache_hit: bool,
        results: Vec<T>,
    ) -> Result<SearchOutcome<T>> {
        let outcome = SearchOutcome::new(results, started);
        self.metrics.record(
            MetricSample::new(operation, started.elapsed())
                .with_cache_hit(cache_hit)
                .with_query(query)
                .with_result_count(outcome.result_count),
        );
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Operational API
    // ------------------------------------------------------------------------

    /// Run the batch pipeline for `selector`.
    pub async fn embed(&self, selector: &Selector) -> Result<BatchReport> {
        self.pipeline.run(selector).await
    }

    /// Embedding coverage and cache occupancy.
    pub async fn embedding_stats(&self) -> Result<EmbeddingStats> {
        let PipelineStats {
            total,
            with_embedding,
            pending,
            percent_complete,
        } = self.pipeline.stats().await?;
        Ok(EmbeddingStats {
            total,
            with_embedding,
            pending,
            percent_complete,
            local_cache_entries: self.cache.local_len(),
            provider: self.cache.generator().provider_name().to_string(),
            model_tag: self.config.embedding.model_tag.clone(),
        })
    }

    /// Index state, table statistics, and recommendations.
    pub async fn index_health_report(&self) -> Result<HealthReport> {
        self.index.health_report().await
    }

    /// Flat metric map for external monitors.
    pub fn export_metrics_for_monitoring(&self) -> BTreeMap<String, f64> {
        self.metrics.export_for_monitoring()
    }

    /// Empty both cache tiers.
    pub async fn clear_cache(&self) -> CacheClearReport {
        self.cache.clear().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use quarry_core::{CatalogRecord, Error, MemoryPersistentCache};
    use quarry_vector::MockEmbeddingProvider;

    fn config() -> QuarryConfig {
        let mut config = QuarryConfig::default();
        config.embedding.provider = "mock".into();
        config.embedding.dimension = 256;
        config
    }

    fn service(records: Vec<CatalogRecord>) -> (Quarry, Arc<MockEmbeddingProvider>) {
        let provider = Arc::new(MockEmbeddingProvider::new(256));
        let components = Components::in_memory(provider.clone())
            .with_store(Arc::new(MemoryCatalogStore::with_records(records)));
        (Quarry::from_components(config(), components).unwrap(), provider)
    }

    #[tokio::test]
    async fn test_from_components_rejects_invalid_config() {
        let mut bad = config();
        bad.search.keyword_weight = 0.9;
        let components = Components::in_memory(Arc::new(MockEmbeddingProvider::new(256)));
        let err = Quarry::from_components(bad, components).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_connect_without_database_uses_memory() {
        let quarry = Quarry::connect(config()).await.unwrap();
        assert_eq!(quarry.store().name(), "memory");
        let stats = quarry.embedding_stats().await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.percent_complete, 0.0);
        assert_eq!(stats.provider, "mock");
        quarry.shutdown().await;
    }

    #[tokio::test]
    async fn test_read_calls_record_samples() {
        let (quarry, _) = service(vec![
            CatalogRecord::new("a", "MIT", "Physics").with_keywords(["physics"]),
        ]);
        quarry.embed(&Selector::AllMissing).await.unwrap();

        quarry
            .semantic_search("physics", 5, &SearchFilters::none(), None)
            .await
            .unwrap();
        quarry
            .keyword_search("physics", 5, &SearchFilters::none())
            .await
            .unwrap();
        quarry
            .smart_search("physics", 5, &SearchFilters::none())
            .await
            .unwrap();

        let perf = quarry.metrics().get_performance(5);
        assert_eq!(perf.by_operation["semantic_search"].count, 1);
        assert_eq!(perf.by_operation["keyword_search"].count, 1);
        assert_eq!(perf.by_operation["hybrid_search"].count, 1);
    }

    #[tokio::test]
    async fn test_second_query_is_cache_hit() {
        let (quarry, provider) = service(vec![CatalogRecord::new("a", "MIT", "Physics")]);
        quarry.embed(&Selector::AllMissing).await.unwrap();
        let calls = provider.call_count();

        quarry
            .semantic_search("quantum physics", 5, &SearchFilters::none(), None)
            .await
            .unwrap();
        quarry
            .semantic_search("  Quantum   PHYSICS ", 5, &SearchFilters::none(), None)
            .await
            .unwrap();
        assert_eq!(provider.call_count(), calls + 1);

        let slowest = quarry.metrics().get_slowest(10, 5);
        assert_eq!(slowest.iter().filter(|s| s.operation == "semantic_search").count(), 2);
        assert!(quarry.metrics().get_cache_stats().total.hits >= 1);
    }

    #[tokio::test]
    async fn test_persistent_cache_is_attached() {
        let provider = Arc::new(MockEmbeddingProvider::new(256));
        let persistent = Arc::new(MemoryPersistentCache::new());
        let components =
            Components::in_memory(provider).with_persistent_cache(persistent.clone());
        let quarry = Quarry::from_components(config(), components).unwrap();

        quarry.cache().get_or_generate("hello world").await.unwrap();
        assert_eq!(persistent.len(), 1);

        let report = quarry.clear_cache().await;
        assert_eq!(report.local_entries, 1);
        assert_eq!(report.persistent_keys, Some(1));
    }
}

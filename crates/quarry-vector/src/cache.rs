//! Two-tier embedding cache.
//!
//! Lookup order for `get_or_generate(text)`:
//!
//! 1. Normalise the text and hash it into `{namespace}:{model_tag}:{blake3}`.
//! 2. Process-local LRU. A hit promotes the key to most-recent.
//! 3. Persistent store. A hit backfills the local tier.
//! 4. Generator. The vector is written through to both tiers.
//!
//! The persistent tier is never authoritative: any error reading, writing,
//! or decoding it is logged and treated as a miss. The local tier is a pure
//! accelerator; losing it only costs latency.

use lru::LruCache;
use parking_lot::Mutex;
use quarry_core::text::normalize_text;
use quarry_core::{
    CacheLayer, Error, MetricSample, MetricsSink, NoopMetricsSink, OperationKind,
    PersistentCache, Result,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use crate::config::CacheConfig;
use crate::generator::EmbeddingGenerator;

/// Where a cached vector came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    /// Process-local LRU.
    Local,
    /// Shared persistent store.
    Persistent,
    /// Freshly generated by the provider.
    Generated,
}

impl CacheSource {
    /// Whether the vector was served without calling the provider.
    pub fn is_hit(&self) -> bool {
        !matches!(self, Self::Generated)
    }
}

/// Result of [`EmbeddingCache::clear`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheClearReport {
    /// Entries dropped from the local tier.
    pub local_entries: usize,
    /// Keys deleted from the persistent tier; `None` if it was unreachable
    /// or not configured.
    pub persistent_keys: Option<u64>,
}

/// Get-or-generate layer in front of an [`EmbeddingGenerator`].
pub struct EmbeddingCache {
    generator: Arc<EmbeddingGenerator>,
    persistent: Option<Arc<dyn PersistentCache>>,
    metrics: Arc<dyn MetricsSink>,
    local: Mutex<LruCache<String, Vec<f32>>>,
    model_tag: String,
    config: CacheConfig,
}

impl EmbeddingCache {
    /// Create a cache keyed by `model_tag`.
    pub fn new(
        generator: Arc<EmbeddingGenerator>,
        model_tag: impl Into<String>,
        config: CacheConfig,
    ) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.local_capacity)
            .ok_or_else(|| Error::config("cache.local_capacity must be > 0"))?;

        Ok(Self {
            generator,
            persistent: None,
            metrics: Arc::new(NoopMetricsSink),
            local: Mutex::new(LruCache::new(capacity)),
            model_tag: model_tag.into(),
            config,
        })
    }

    /// Attach the shared persistent tier.
    pub fn with_persistent(mut self, persistent: Arc<dyn PersistentCache>) -> Self {
        self.persistent = Some(persistent);
        self
    }

    /// Report cache accesses and generation latency to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The underlying generator.
    pub fn generator(&self) -> &Arc<EmbeddingGenerator> {
        &self.generator
    }

    /// Number of entries in the local tier.
    pub fn local_len(&self) -> usize {
        self.local.lock().len()
    }

    /// The cache key for `text`.
    pub fn cache_key(&self, text: &str) -> String {
        self.key_for_normalized(&normalize_text(text))
    }

    fn key_for_normalized(&self, normalized: &str) -> String {
        let hash = blake3::hash(normalized.as_bytes());
        format!("{}:{}:{}", self.config.namespace, self.model_tag, hash.to_hex())
    }

    /// Return the vector for `text`, generating it on a total miss.
    pub async fn get_or_generate(&self, text: &str) -> Result<Vec<f32>> {
        self.lookup(text).await.map(|(vector, _)| vector)
    }

    /// Like [`get_or_generate`](Self::get_or_generate), also reporting
    /// which tier served the vector.
    pub async fn lookup(&self, text: &str) -> Result<(Vec<f32>, CacheSource)> {
        let started = Instant::now();
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Err(Error::validation("cannot embed empty text"));
        }
        let key = self.key_for_normalized(&normalized);

        let local_hit = self.local.lock().get(&key).cloned();
        self.metrics
            .record_cache_access(local_hit.is_some(), CacheLayer::Local);
        if let Some(vector) = local_hit {
            self.record_sample(started, CacheSource::Local);
            return Ok((vector, CacheSource::Local));
        }

        if let Some(vector) = self.read_persistent(&key).await {
            self.local.lock().put(key, vector.clone());
            self.record_sample(started, CacheSource::Persistent);
            return Ok((vector, CacheSource::Persistent));
        }

        let vector = self.generator.generate(&normalized).await?;
        self.local.lock().put(key.clone(), vector.clone());
        self.write_persistent(&key, &vector).await;
        self.record_sample(started, CacheSource::Generated);
        Ok((vector, CacheSource::Generated))
    }

    /// Purge both tiers.
    pub async fn clear(&self) -> CacheClearReport {
        let local_entries = {
            let mut local = self.local.lock();
            let n = local.len();
            local.clear();
            n
        };

        let persistent_keys = match &self.persistent {
            Some(persistent) => {
                let pattern = format!("{}:*", self.config.namespace);
                match persistent.delete_pattern(&pattern).await {
                    Ok(n) => Some(n),
                    Err(e) => {
                        log::warn!(
                            "Persistent cache '{}' clear failed: {e}",
                            persistent.name()
                        );
                        None
                    }
                }
            }
            None => None,
        };

        log::info!(
            "Embedding cache cleared: {local_entries} local entries, {persistent_keys:?} persistent keys"
        );
        CacheClearReport {
            local_entries,
            persistent_keys,
        }
    }

    async fn read_persistent(&self, key: &str) -> Option<Vec<f32>> {
        let persistent = self.persistent.as_ref()?;

        let found = match persistent.get(key).await {
            Ok(found) => found,
            Err(e) => {
                log::warn!("Persistent cache '{}' read failed: {e}", persistent.name());
                None
            }
        };

        let vector = found.and_then(|raw| match serde_json::from_str::<Vec<f32>>(&raw) {
            Ok(v) if v.len() == self.generator.dimension() => Some(v),
            Ok(v) => {
                log::warn!(
                    "Ignoring cached vector of dimension {} for {key}, expected {}",
                    v.len(),
                    self.generator.dimension()
                );
                None
            }
            Err(e) => {
                log::warn!("Ignoring undecodable cached vector for {key}: {e}");
                None
            }
        });

        self.metrics
            .record_cache_access(vector.is_some(), CacheLayer::Persistent);
        vector
    }

    async fn write_persistent(&self, key: &str, vector: &[f32]) {
        let Some(persistent) = &self.persistent else {
            return;
        };
        let raw = match serde_json::to_string(vector) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Failed to encode vector for {key}: {e}");
                return;
            }
        };
        if let Err(e) = persistent.set(key, &raw, self.config.ttl()).await {
            log::warn!("Persistent cache '{}' write failed: {e}", persistent.name());
        }
    }

    fn record_sample(&self, started: Instant, source: CacheSource) {
        self.metrics.record(
            MetricSample::new(OperationKind::Embedding, started.elapsed())
                .with_cache_hit(source.is_hit()),
        );
    }
}

// ============================================================================
// Tests
// ============================================================================

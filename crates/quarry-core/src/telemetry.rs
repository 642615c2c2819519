//! Metrics sink seam.
//!
//! Components that want to report latency or cache behaviour receive an
//! `Arc<dyn MetricsSink>` at construction. The concrete recorder lives in
//! `quarry-metrics`; this crate only defines the contract so that caching
//! and monitoring do not depend on each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of operation a metric sample describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Vector-only search.
    SemanticSearch,
    /// Keyword-only search.
    KeywordSearch,
    /// Fused search.
    HybridSearch,
    /// Similar-record lookup.
    FindSimilar,
    /// Single query embedding (cache path).
    Embedding,
    /// One batch-pipeline chunk.
    BatchChunk,
}

impl OperationKind {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SemanticSearch => "semantic_search",
            Self::KeywordSearch => "keyword_search",
            Self::HybridSearch => "hybrid_search",
            Self::FindSimilar => "find_similar",
            Self::Embedding => "embedding",
            Self::BatchChunk => "batch_chunk",
        }
    }

    /// Whether this kind is a user-facing search.
    pub fn is_search(&self) -> bool {
        matches!(
            self,
            Self::SemanticSearch | Self::KeywordSearch | Self::HybridSearch | Self::FindSimilar
        )
    }

    /// All kinds, in a fixed order.
    pub fn all() -> [Self; 6] {
        [
            Self::SemanticSearch,
            Self::KeywordSearch,
            Self::HybridSearch,
            Self::FindSimilar,
            Self::Embedding,
            Self::BatchChunk,
        ]
    }
}

/// Cache tier that served (or missed) a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLayer {
    /// Process-local LRU.
    Local,
    /// Shared persistent key-value store.
    Persistent,
}

impl CacheLayer {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Persistent => "persistent",
        }
    }
}

/// One timed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// When the operation finished.
    pub timestamp: DateTime<Utc>,
    /// What ran.
    pub operation: OperationKind,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// Whether the query embedding came from cache.
    pub cache_hit: bool,
    /// Query text, when the operation had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Number of results produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_count: Option<usize>,
}

impl MetricSample {
    /// Create a sample stamped with the current time.
    pub fn new(operation: OperationKind, duration: Duration) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            duration_ms: duration.as_micros() as f64 / 1000.0,
            cache_hit: false,
            query: None,
            result_count: None,
        }
    }

    /// Set the cache-hit flag.
    pub fn with_cache_hit(mut self, hit: bool) -> Self {
        self.cache_hit = hit;
        self
    }

    /// Attach the query text.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Attach the result count.
    pub fn with_result_count(mut self, count: usize) -> Self {
        self.result_count = Some(count);
        self
    }

    /// Override the timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Receiver of latency samples and cache access events.
///
/// Implementations must be cheap and non-blocking; they are called on the
/// search path.
pub trait MetricsSink: Send + Sync {
    /// Record a completed operation.
    fn record(&self, sample: MetricSample);

    /// Record a cache lookup against one tier.
    fn record_cache_access(&self, hit: bool, layer: CacheLayer);
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record(&self, _sample: MetricSample) {}

    fn record_cache_access(&self, _hit: bool, _layer: CacheLayer) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_builder() {
        let sample = MetricSample::new(OperationKind::HybridSearch, Duration::from_millis(12))
            .with_cache_hit(true)
            .with_query("mit cs")
            .with_result_count(3);
        assert!((sample.duration_ms - 12.0).abs() < 1e-9);
        assert!(sample.cache_hit);
        assert_eq!(sample.query.as_deref(), Some("mit cs"));
        assert_eq!(sample.result_count, Some(3));
    }

    #[test]
    fn test_operation_names_unique() {
        let mut names: Vec<_> = OperationKind::all().iter().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), OperationKind::all().len());
    }

    #[test]
    fn test_is_search() {
        assert!(OperationKind::FindSimilar.is_search());
        assert!(OperationKind::KeywordSearch.is_search());
        assert!(!OperationKind::Embedding.is_search());
        assert!(!OperationKind::BatchChunk.is_search());
    }

    #[test]
    fn test_noop_sink_is_object_safe() {
        let sink: Box<dyn MetricsSink> = Box::new(NoopMetricsSink);
        sink.record(MetricSample::new(OperationKind::Embedding, Duration::ZERO));
        sink.record_cache_access(true, CacheLayer::Local);
    }
}

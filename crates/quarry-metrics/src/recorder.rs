//! Metrics recorder: bounded ring buffer of latency samples plus per-layer
//! cache counters.
//!
//! Samples are appended through the [`MetricsSink`] trait and summarised on
//! demand. Headline latency and hit-rate figures cover search operations
//! only; embedding and batch samples appear in the per-operation breakdown.
//! Percentiles use the sorted-array rule `index = floor(n * p)`, clamped to
//! the last element.

use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use quarry_core::text::truncate_chars;
use quarry_core::{CacheLayer, MetricSample, MetricsSink, OperationKind, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::config::MetricsConfig;

// ============================================================================
// Report types
// ============================================================================

/// Latency summary for one operation kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    /// Samples in window.
    pub count: usize,
    /// Mean duration.
    pub mean_ms: f64,
    /// 95th percentile duration.
    pub p95_ms: f64,
}

/// Latency summary over a time window.
///
/// The headline fields aggregate search samples only
/// ([`OperationKind::is_search`]); `by_operation` covers every kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Window length.
    pub window_minutes: u32,
    /// Search samples in window.
    pub sample_count: usize,
    /// Mean duration.
    pub mean_ms: f64,
    /// Median duration.
    pub p50_ms: f64,
    /// 95th percentile duration.
    pub p95_ms: f64,
    /// 99th percentile duration.
    pub p99_ms: f64,
    /// Fraction of in-window search samples whose query embedding was cached.
    pub cache_hit_rate: f64,
    /// Per-operation breakdown, keyed by operation name.
    pub by_operation: BTreeMap<String, OperationStats>,
}

/// Hit/miss counters for one cache tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerStats {
    /// Hits.
    pub hits: u64,
    /// Misses.
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0 with no accesses.
    pub hit_rate: f64,
}

impl LayerStats {
    fn from_counts(hits: u64, misses: u64) -> Self {
        Self {
            hits,
            misses,
            hit_rate: hit_rate(hits, misses),
        }
    }
}

/// Cache statistics across tiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Per-tier counters keyed by layer name.
    pub layers: BTreeMap<String, LayerStats>,
    /// Totals across tiers.
    pub total: LayerStats,
}

/// One entry of the slowest-samples report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowSample {
    /// When the operation finished (RFC 3339).
    pub timestamp: String,
    /// Operation name.
    pub operation: String,
    /// Duration.
    pub duration_ms: f64,
    /// Query text, truncated.
    pub query: Option<String>,
    /// Results produced.
    pub result_count: Option<usize>,
}

// ============================================================================
// Recorder
// ============================================================================

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
}

#[derive(Debug, Default)]
struct Inner {
    samples: VecDeque<MetricSample>,
    cache: BTreeMap<CacheLayer, Counters>,
    dropped: u64,
}

/// Bounded in-process metrics recorder.
#[derive(Debug)]
pub struct MetricsRecorder {
    config: MetricsConfig,
    inner: Mutex<Inner>,
}

impl MetricsRecorder {
    /// Create a recorder after validating `config`.
    pub fn new(config: MetricsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Mutex::new(Inner {
                samples: VecDeque::with_capacity(config.buffer_capacity.min(1024)),
                ..Default::default()
            }),
            config,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.inner.lock().samples.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().samples.is_empty()
    }

    /// Append a sample, dropping the oldest beyond capacity.
    pub fn record(&self, sample: MetricSample) {
        let mut inner = self.inner.lock();
        while inner.samples.len() >= self.config.buffer_capacity {
            inner.samples.pop_front();
            inner.dropped += 1;
        }
        inner.samples.push_back(sample);
    }

    /// Count one cache access against `layer`.
    pub fn record_cache_access(&self, hit: bool, layer: CacheLayer) {
        let mut inner = self.inner.lock();
        let counters = inner.cache.entry(layer).or_default();
        if hit {
            counters.hits += 1;
        } else {
            counters.misses += 1;
        }
    }

    /// Summarise samples from the last `window_minutes`.
    pub fn get_performance(&self, window_minutes: u32) -> PerformanceStats {
        let cutoff = Utc::now() - ChronoDuration::minutes(i64::from(window_minutes));
        let inner = self.inner.lock();
        let in_window: Vec<&MetricSample> = inner
            .samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .collect();

        if in_window.is_empty() {
            return PerformanceStats {
                window_minutes,
                ..Default::default()
            };
        }

        let searches: Vec<&MetricSample> = in_window
            .iter()
            .copied()
            .filter(|s| s.operation.is_search())
            .collect();
        let mut durations: Vec<f64> = searches.iter().map(|s| s.duration_ms).collect();
        durations.sort_by(f64::total_cmp);
        let hits = searches.iter().filter(|s| s.cache_hit).count();

        let mut grouped: BTreeMap<OperationKind, Vec<f64>> = BTreeMap::new();
        for sample in &in_window {
            grouped
                .entry(sample.operation)
                .or_default()
                .push(sample.duration_ms);
        }
        let by_operation = grouped
            .into_iter()
            .map(|(op, mut values)| {
                values.sort_by(f64::total_cmp);
                let stats = OperationStats {
                    count: values.len(),
                    mean_ms: mean(&values),
                    p95_ms: percentile(&values, 0.95),
                };
                (op.as_str().to_string(), stats)
            })
            .collect();

        PerformanceStats {
            window_minutes,
            sample_count: durations.len(),
            mean_ms: mean(&durations),
            p50_ms: percentile(&durations, 0.50),
            p95_ms: percentile(&durations, 0.95),
            p99_ms: percentile(&durations, 0.99),
            cache_hit_rate: if searches.is_empty() {
                0.0
            } else {
                hits as f64 / searches.len() as f64
            },
            by_operation,
        }
    }

    /// Per-layer and total cache hit rates.
    pub fn get_cache_stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let mut total_hits = 0;
        let mut total_misses = 0;
        let layers = inner
            .cache
            .iter()
            .map(|(layer, c)| {
                total_hits += c.hits;
                total_misses += c.misses;
                (
                    layer.as_str().to_string(),
                    LayerStats::from_counts(c.hits, c.misses),
                )
            })
            .collect();

        CacheStats {
            layers,
            total: LayerStats::from_counts(total_hits, total_misses),
        }
    }

    /// The `n` slowest samples in the window, longest first.
    pub fn get_slowest(&self, n: usize, window_minutes: u32) -> Vec<SlowSample> {
        let cutoff = Utc::now() - ChronoDuration::minutes(i64::from(window_minutes));
        let inner = self.inner.lock();
        let mut in_window: Vec<&MetricSample> = inner
            .samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .collect();
        in_window.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));

        in_window
            .into_iter()
            .take(n)
            .map(|s| SlowSample {
                timestamp: s.timestamp.to_rfc3339(),
                operation: s.operation.as_str().to_string(),
                duration_ms: s.duration_ms,
                query: s
                    .query
                    .as_deref()
                    .map(|q| truncate_chars(q, self.config.query_truncation)),
                result_count: s.result_count,
            })
            .collect()
    }

    /// Flatten current stats into a single-level map for external monitors.
    pub fn export_for_monitoring(&self) -> BTreeMap<String, f64> {
        let perf = self.get_performance(self.config.export_window_minutes);
        let cache = self.get_cache_stats();
        let (buffered, dropped) = {
            let inner = self.inner.lock();
            (inner.samples.len(), inner.dropped)
        };

        let mut out = BTreeMap::new();
        out.insert("search.sample_count".to_string(), perf.sample_count as f64);
        out.insert("search.mean_ms".to_string(), perf.mean_ms);
        out.insert("search.p50_ms".to_string(), perf.p50_ms);
        out.insert("search.p95_ms".to_string(), perf.p95_ms);
        out.insert("search.p99_ms".to_string(), perf.p99_ms);
        out.insert("search.cache_hit_rate".to_string(), perf.cache_hit_rate);

        for (name, op) in &perf.by_operation {
            out.insert(format!("operation.{name}.count"), op.count as f64);
            out.insert(format!("operation.{name}.mean_ms"), op.mean_ms);
            out.insert(format!("operation.{name}.p95_ms"), op.p95_ms);
        }

        out.insert("cache.hits".to_string(), cache.total.hits as f64);
        out.insert("cache.misses".to_string(), cache.total.misses as f64);
        out.insert("cache.hit_rate".to_string(), cache.total.hit_rate);
        for (name, layer) in &cache.layers {
            out.insert(format!("cache.{name}.hits"), layer.hits as f64);
            out.insert(format!("cache.{name}.misses"), layer.misses as f64);
            out.insert(format!("cache.{name}.hit_rate"), layer.hit_rate);
        }

        out.insert("buffer.len".to_string(), buffered as f64);
        out.insert(
            "buffer.capacity".to_string(),
            self.config.buffer_capacity as f64,
        );
        out.insert("buffer.dropped".to_string(), dropped as f64);
        out
    }

    /// Clear samples and counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.samples.clear();
        inner.cache.clear();
        inner.dropped = 0;
        log::debug!("Metrics recorder reset");
    }
}

impl MetricsSink for MetricsRecorder {
    fn record(&self, sample: MetricSample) {
        MetricsRecorder::record(self, sample);
    }

    fn record_cache_access(&self, hit: bool, layer: CacheLayer) {
        MetricsRecorder::record_cache_access(self, hit, layer);
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Percentile of an ascending slice: `sorted[floor(n * p)]`, clamped.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64) * p).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn recorder(capacity: usize) -> MetricsRecorder {
        MetricsRecorder::new(MetricsConfig {
            buffer_capacity: capacity,
            ..Default::default()
        })
        .unwrap()
    }

    fn sample(op: OperationKind, ms: u64) -> MetricSample {
        MetricSample::new(op, Duration::from_millis(ms))
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let rec = recorder(3);
        for ms in [1, 2, 3, 4] {
            rec.record(sample(OperationKind::SemanticSearch, ms));
        }
        assert_eq!(rec.len(), 3);
        let slowest = rec.get_slowest(10, 60);
        let durations: Vec<f64> = slowest.iter().map(|s| s.duration_ms).collect();
        assert_eq!(durations, vec![4.0, 3.0, 2.0]);
        assert_eq!(rec.export_for_monitoring()["buffer.dropped"], 1.0);
    }

    #[test]
    fn test_percentiles_floor_index() {
        let rec = recorder(100);
        for ms in 1..=10 {
            rec.record(sample(OperationKind::HybridSearch, ms));
        }
        let perf = rec.get_performance(60);
        assert_eq!(perf.sample_count, 10);
        assert!((perf.mean_ms - 5.5).abs() < 1e-9);
        // floor(10 * 0.5) = 5 -> sixth smallest
        assert_eq!(perf.p50_ms, 6.0);
        // floor(10 * 0.95) = 9 -> largest
        assert_eq!(perf.p95_ms, 10.0);
        assert_eq!(perf.p99_ms, 10.0);
    }

    #[test]
    fn test_performance_window_excludes_old_samples() {
        let rec = recorder(100);
        let old = Utc::now() - ChronoDuration::minutes(30);
        rec.record(sample(OperationKind::SemanticSearch, 500).at(old));
        rec.record(sample(OperationKind::SemanticSearch, 10));

        let perf = rec.get_performance(5);
        assert_eq!(perf.sample_count, 1);
        assert_eq!(perf.p99_ms, 10.0);
        assert_eq!(rec.get_performance(60).sample_count, 2);
    }

    #[test]
    fn test_headline_stats_ignore_background_work() {
        let rec = recorder(100);
        for _ in 0..4 {
            rec.record(sample(OperationKind::HybridSearch, 10).with_cache_hit(true));
            rec.record(sample(OperationKind::BatchChunk, 7_000));
        }
        rec.record(sample(OperationKind::Embedding, 400));

        let perf = rec.get_performance(5);
        assert_eq!(perf.sample_count, 4);
        assert_eq!(perf.p50_ms, 10.0);
        assert_eq!(perf.p99_ms, 10.0);
        assert_eq!(perf.cache_hit_rate, 1.0);
        assert_eq!(perf.by_operation["batch_chunk"].count, 4);
        assert_eq!(perf.by_operation["embedding"].count, 1);

        let export = rec.export_for_monitoring();
        assert_eq!(export["search.p50_ms"], 10.0);
        assert_eq!(export["search.mean_ms"], 10.0);
        assert_eq!(export["search.cache_hit_rate"], 1.0);
        assert_eq!(export["operation.batch_chunk.mean_ms"], 7_000.0);
    }

    #[test]
    fn test_only_background_samples_leave_headline_zeroed() {
        let rec = recorder(10);
        rec.record(sample(OperationKind::BatchChunk, 900));
        let perf = rec.get_performance(5);
        assert_eq!(perf.sample_count, 0);
        assert_eq!(perf.mean_ms, 0.0);
        assert_eq!(perf.cache_hit_rate, 0.0);
        assert_eq!(perf.by_operation["batch_chunk"].count, 1);
    }

    #[test]
    fn test_empty_window_is_zeroed() {
        let perf = recorder(10).get_performance(5);
        assert_eq!(perf.sample_count, 0);
        assert_eq!(perf.mean_ms, 0.0);
        assert!(perf.by_operation.is_empty());
    }

    #[test]
    fn test_per_operation_breakdown() {
        let rec = recorder(100);
        rec.record(sample(OperationKind::SemanticSearch, 10).with_cache_hit(true));
        rec.record(sample(OperationKind::HybridSearch, 30));
        rec.record(sample(OperationKind::HybridSearch, 50));

        let perf = rec.get_performance(5);
        assert_eq!(perf.by_operation["hybrid_search"].count, 2);
        assert_eq!(perf.by_operation["hybrid_search"].mean_ms, 40.0);
        assert_eq!(perf.by_operation["semantic_search"].count, 1);
        assert!((perf.cache_hit_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_cache_stats_zero_guard() {
        let stats = recorder(10).get_cache_stats();
        assert_eq!(stats.total.hit_rate, 0.0);
        assert!(stats.layers.is_empty());
    }

    #[test]
    fn test_cache_stats_per_layer() {
        let rec = recorder(10);
        rec.record_cache_access(true, CacheLayer::Local);
        rec.record_cache_access(false, CacheLayer::Local);
        rec.record_cache_access(true, CacheLayer::Persistent);
        rec.record_cache_access(true, CacheLayer::Local);

        let stats = rec.get_cache_stats();
        let local = stats.layers["local"];
        assert_eq!(local.hits, 2);
        assert_eq!(local.misses, 1);
        assert!((local.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.layers["persistent"].hit_rate, 1.0);
        assert_eq!(stats.total.hits, 3);
        assert!((stats.total.hit_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_slowest_truncates_query() {
        let rec = MetricsRecorder::new(MetricsConfig {
            query_truncation: 5,
            ..Default::default()
        })
        .unwrap();
        rec.record(sample(OperationKind::SemanticSearch, 5).with_query("short"));
        rec.record(sample(OperationKind::HybridSearch, 90).with_query("a much longer query"));

        let slowest = rec.get_slowest(1, 5);
        assert_eq!(slowest.len(), 1);
        assert_eq!(slowest[0].operation, "hybrid_search");
        assert_eq!(slowest[0].query.as_deref(), Some("a muc…"));
    }

    #[test]
    fn test_export_is_flat() {
        let rec = recorder(10);
        rec.record(sample(OperationKind::FindSimilar, 7));
        rec.record_cache_access(false, CacheLayer::Persistent);

        let export = rec.export_for_monitoring();
        assert_eq!(export["search.sample_count"], 1.0);
        assert_eq!(export["operation.find_similar.count"], 1.0);
        assert_eq!(export["cache.persistent.misses"], 1.0);
        assert_eq!(export["buffer.capacity"], 10.0);
    }

    #[test]
    fn test_reset() {
        let rec = recorder(10);
        rec.record(sample(OperationKind::Embedding, 1));
        rec.record_cache_access(true, CacheLayer::Local);
        rec.reset();
        assert!(rec.is_empty());
        assert_eq!(rec.get_cache_stats().total.hits, 0);
    }

    #[test]
    fn test_usable_as_sink() {
        let rec = std::sync::Arc::new(recorder(10));
        let sink: std::sync::Arc<dyn MetricsSink> = rec.clone();
        sink.record(sample(OperationKind::KeywordSearch, 2));
        sink.record_cache_access(true, CacheLayer::Local);
        assert_eq!(rec.len(), 1);
        assert_eq!(rec.get_cache_stats().total.hits, 1);
    }

    proptest! {
        #[test]
        fn prop_percentiles_are_ordered(values in proptest::collection::vec(0u64..10_000, 1..200)) {
            let rec = recorder(1_000);
            for v in &values {
                rec.record(sample(OperationKind::SemanticSearch, *v));
            }
            let perf = rec.get_performance(60);
            prop_assert!(perf.p50_ms <= perf.p95_ms);
            prop_assert!(perf.p95_ms <= perf.p99_ms);
            prop_assert_eq!(perf.sample_count, values.len());
        }
    }
}

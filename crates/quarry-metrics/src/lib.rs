//! Performance and cache-hit tracking for Quarry.
//!
//! [`MetricsRecorder`] keeps the most recent samples in a bounded ring buffer
//! and computes latency percentiles, cache hit rates, and a flat export for
//! external monitors. It implements [`quarry_core::MetricsSink`], so the
//! embedding cache and search components report into it without depending on
//! this crate.

pub mod config;
pub mod recorder;

pub use config::MetricsConfig;
pub use recorder::{
    CacheStats, LayerStats, MetricsRecorder, OperationStats, PerformanceStats, SlowSample,
};

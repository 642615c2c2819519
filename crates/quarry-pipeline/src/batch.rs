//! Batch embedding pipeline.
//!
//! Keeps stored vectors current: resolves the target records, chunks them to
//! the provider's batch limit, generates each chunk with exponential-backoff
//! retry, and persists each chunk in one transaction. A chunk that exhausts
//! its retries is recorded as failed and the run moves on.
//!
//! Chunks are processed strictly sequentially with a fixed sleep between
//! them derived from the provider's requests-per-minute quota. The pipeline
//! does not read live rate-limit feedback from the provider.

use backon::{ExponentialBuilder, Retryable};
use chrono::{Duration as ChronoDuration, Utc};
use quarry_core::text::compose_embedding_text;
use quarry_core::{
    CatalogStore, EmbeddingUpdate, Error, MetricSample, MetricsSink, NoopMetricsSink,
    OperationKind, Result,
};
use quarry_vector::EmbeddingGenerator;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{PipelineConfig, pacing_delay};

// ============================================================================
// Types
// ============================================================================

/// Which records a run targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Selector {
    /// Every record whose embedding is null.
    AllMissing,
    /// An explicit id list, deduplicated in order.
    Ids {
        /// Record identifiers.
        ids: Vec<String>,
    },
    /// Records embedded more than `days` ago, or never.
    StaleOlderThan {
        /// Age threshold.
        days: u32,
    },
}

impl Selector {
    /// Convenience constructor for [`Selector::Ids`].
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Ids {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

/// One failed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    /// Record identifier.
    pub id: String,
    /// Captured error.
    pub message: String,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Records whose vector was written.
    pub success_count: usize,
    /// Records that failed.
    pub failed_count: usize,
    /// Per-record failures.
    pub errors: Vec<RecordError>,
    /// Chunks attempted.
    pub chunks_processed: usize,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

impl BatchReport {
    fn fail_all(&mut self, ids: &[String], message: &str) {
        self.failed_count += ids.len();
        self.errors.extend(ids.iter().map(|id| RecordError {
            id: id.clone(),
            message: message.to_string(),
        }));
    }
}

/// Embedding coverage summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Total records.
    pub total: usize,
    /// Records with an embedding.
    pub with_embedding: usize,
    /// Records still missing one.
    pub pending: usize,
    /// `with_embedding / total * 100`, or 0 for an empty catalog.
    pub percent_complete: f64,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Rate-limited, partial-failure-tolerant embedding pipeline.
pub struct BatchEmbeddingPipeline {
    store: Arc<dyn CatalogStore>,
    generator: Arc<EmbeddingGenerator>,
    metrics: Arc<dyn MetricsSink>,
    config: PipelineConfig,
}

impl BatchEmbeddingPipeline {
    /// Create a pipeline after validating `config`.
    pub fn new(
        store: Arc<dyn CatalogStore>,
        generator: Arc<EmbeddingGenerator>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            generator,
            metrics: Arc::new(NoopMetricsSink),
            config,
        })
    }

    /// Report per-chunk timings to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Effective chunk size: configured size clamped to the provider limit.
    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size.min(self.generator.max_batch_size())
    }

    /// Sleep between chunks.
    pub fn inter_chunk_delay(&self) -> Duration {
        pacing_delay(self.generator.requests_per_minute())
    }

    /// Embed every record picked by `selector`.
    ///
    /// Only failures to resolve the target ids are returned as `Err`;
    /// per-chunk failures are reported in the [`BatchReport`].
    pub async fn run(&self, selector: &Selector) -> Result<BatchReport> {
        let started = Instant::now();
        let ids = self.resolve(selector).await?;
        let mut report = BatchReport::default();

        if ids.is_empty() {
            log::info!("Batch pipeline: nothing to embed for {selector:?}");
            return Ok(report);
        }

        let chunk_size = self.chunk_size();
        let delay = self.inter_chunk_delay();
        let total_chunks = ids.len().div_ceil(chunk_size);
        log::info!(
            "Batch pipeline: {} records in {total_chunks} chunks of {chunk_size}",
            ids.len()
        );

        for (index, chunk) in ids.chunks(chunk_size).enumerate() {
            let chunk_started = Instant::now();
            match self.process_chunk(chunk).await {
                Ok(ChunkOutcome { written, missing }) => {
                    report.success_count += written;
                    report.fail_all(&missing, "record not found");
                    log::debug!(
                        "Chunk {}/{total_chunks}: {written} embeddings written",
                        index + 1
                    );
                }
                Err(e) => {
                    log::warn!(
                        "Chunk {}/{total_chunks} failed ({} records): {e}",
                        index + 1,
                        chunk.len()
                    );
                    report.fail_all(chunk, &e.to_string());
                }
            }
            report.chunks_processed += 1;
            self.metrics.record(
                MetricSample::new(OperationKind::BatchChunk, chunk_started.elapsed())
                    .with_result_count(chunk.len()),
            );

            if index + 1 < total_chunks && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!(
            "Batch pipeline finished: {} succeeded, {} failed in {} ms",
            report.success_count,
            report.failed_count,
            report.duration_ms
        );
        Ok(report)
    }

    /// Re-embed records older than `days` (or never embedded).
    pub async fn regenerate_stale(&self, days: u32) -> Result<BatchReport> {
        self.run(&Selector::StaleOlderThan { days }).await
    }

    /// Embedding coverage across the catalog.
    pub async fn stats(&self) -> Result<PipelineStats> {
        let coverage = self.store.coverage().await?;
        let pending = coverage.total.saturating_sub(coverage.with_embedding);
        let percent_complete = if coverage.total == 0 {
            0.0
        } else {
            coverage.with_embedding as f64 / coverage.total as f64 * 100.0
        };
        Ok(PipelineStats {
            total: coverage.total,
            with_embedding: coverage.with_embedding,
            pending,
            percent_complete,
        })
    }

    async fn resolve(&self, selector: &Selector) -> Result<Vec<String>> {
        match selector {
            Selector::AllMissing => self.store.ids_missing_embedding().await,
            Selector::Ids { ids } => {
                let mut seen = HashSet::new();
                Ok(ids
                    .iter()
                    .filter(|id| seen.insert(id.as_str()))
                    .cloned()
                    .collect())
            }
            Selector::StaleOlderThan { days } => {
                let cutoff = Utc::now() - ChronoDuration::days(i64::from(*days));
                self.store.ids_stale(cutoff).await
            }
        }
    }

    async fn process_chunk(&self, ids: &[String]) -> Result<ChunkOutcome> {
        let inputs = self.store.fetch_embedding_inputs(ids).await?;

        let found: HashSet<&str> = inputs.iter().map(|i| i.id.as_str()).collect();
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !found.contains(id.as_str()))
            .cloned()
            .collect();
        if inputs.is_empty() {
            return Ok(ChunkOutcome {
                written: 0,
                missing,
            });
        }

        let texts: Vec<String> = inputs.iter().map(compose_embedding_text).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.config.base_delay())
            .with_max_delay(self.config.max_delay())
            .with_factor(2.0)
            .with_max_times(self.config.max_retries);

        let vectors = (|| async { self.generator.generate_batch(&refs).await })
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .when(Error::is_retryable)
            .notify(|err: &Error, dur: Duration| {
                log::warn!("Embedding batch failed, retrying in {dur:?}: {err}");
            })
            .await?;

        let updates: Vec<EmbeddingUpdate> = inputs
            .into_iter()
            .zip(vectors)
            .map(|(input, embedding)| EmbeddingUpdate {
                id: input.id,
                embedding,
            })
            .collect();

        self.store.write_embeddings(&updates, Utc::now()).await?;
        Ok(ChunkOutcome {
            written: updates.len(),
            missing,
        })
    }
}

struct ChunkOutcome {
    written: usize,
    missing: Vec<String>,
}

// ============================================================================
// Tests
// ============================================================================

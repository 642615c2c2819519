//! Batch embedding pipeline for Quarry.
//!
//! Generates and persists embeddings for catalog records in paced chunks,
//! retrying transient provider failures with exponential backoff and
//! recording per-record failures instead of aborting the run.

pub mod batch;
pub mod config;

pub use batch::{BatchEmbeddingPipeline, BatchReport, PipelineStats, RecordError, Selector};
pub use config::{PipelineConfig, pacing_delay};

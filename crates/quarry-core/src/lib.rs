//! Domain model and storage seams shared by every Quarry crate.
//!
//! Nothing here depends on another Quarry crate. Backends (Postgres, Redis,
//! HTTP providers) live downstream and plug in through [`traits`].
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`types`]: Catalog records, filters, and search results
//! - [`text`]: Text normalisation, embedding-text composition, cosine math
//! - [`telemetry`]: Metric samples and the `MetricsSink` seam
//! - [`traits`]: `CatalogStore` and `PersistentCache` seams
//! - [`memory`]: In-memory seam implementations for tests and local runs

pub mod error;
pub mod memory;
pub mod telemetry;
pub mod text;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use memory::{MemoryCatalogStore, MemoryPersistentCache};
pub use telemetry::{CacheLayer, MetricSample, MetricsSink, NoopMetricsSink, OperationKind};
pub use traits::{CatalogStore, PersistentCache};
pub use types::{
    CatalogRecord, EmbeddingCoverage, EmbeddingInput, EmbeddingUpdate, KeywordCandidate, MatchType,
    Neighbor, RecordKey, SearchFilters, SearchOutcome, SearchResult,
};

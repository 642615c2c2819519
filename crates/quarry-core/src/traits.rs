//! Seam traits for the external collaborators Quarry talks to.
//!
//! - [`CatalogStore`]: the relational + vector-capable record store
//! - [`PersistentCache`]: the shared string key-value cache with TTL
//!
//! Every method is an external call and therefore a suspension point.
//! Implementations must be `Send + Sync` so components can share them
//! through `Arc<dyn ...>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::Result;
use crate::types::{
    CatalogRecord, EmbeddingCoverage, EmbeddingInput, EmbeddingUpdate, KeywordCandidate, Neighbor,
    RecordKey, SearchFilters,
};

/// Catalog record store with nearest-neighbor support.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Point lookup by identifier.
    async fn get(&self, id: &str) -> Result<Option<CatalogRecord>>;

    /// Point lookup by unique grouping key.
    async fn get_by_key(&self, key: &RecordKey) -> Result<Option<CatalogRecord>>;

    /// Insert or update by grouping key. Returns the stored record id.
    ///
    /// Used by ingestion and tests; the search core never calls it.
    async fn upsert(&self, record: CatalogRecord) -> Result<String>;

    /// Identifiers of records whose embedding is null.
    async fn ids_missing_embedding(&self) -> Result<Vec<String>>;

    /// Identifiers of records embedded before `cutoff`, or never embedded.
    async fn ids_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>>;

    /// Every record identifier.
    async fn all_ids(&self) -> Result<Vec<String>>;

    /// Minimal fields needed to compose embedding text, in `ids` order.
    /// Unknown ids are skipped.
    async fn fetch_embedding_inputs(&self, ids: &[String]) -> Result<Vec<EmbeddingInput>>;

    /// Write all vectors and timestamps in one transaction.
    ///
    /// Either every update is applied or none is.
    async fn write_embeddings(
        &self,
        updates: &[EmbeddingUpdate],
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Nearest neighbors by ascending cosine distance, limited server-side.
    async fn nearest(
        &self,
        vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
        exclude_id: Option<&str>,
    ) -> Result<Vec<Neighbor>>;

    /// Keyword lists of every record passing `filters`.
    async fn keyword_candidates(&self, filters: &SearchFilters) -> Result<Vec<KeywordCandidate>>;

    /// Embedding coverage counts.
    async fn coverage(&self) -> Result<EmbeddingCoverage>;

    /// Release connections. Default: nothing to release.
    async fn close(&self) {}

    /// The backend name for diagnostics.
    fn name(&self) -> &str;
}

/// Shared persistent cache keyed by string.
///
/// The cache is never authoritative; callers treat every error as a miss.
#[async_trait]
pub trait PersistentCache: Send + Sync {
    /// Fetch a live value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value that expires after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Delete every key matching a glob pattern (`*` wildcard).
    /// Returns the number of deleted keys.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64>;

    /// The backend name for diagnostics.
    fn name(&self) -> &str;
}

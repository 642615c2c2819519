//! Vector similarity search over the catalog store.

use quarry_core::{CatalogStore, Error, RecordKey, Result, SearchFilters};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::EmbeddingCache;

/// Convert cosine distance `d ∈ [0, 2]` to similarity `1 - d/2 ∈ [0, 1]`.
///
/// Out-of-range distances (float noise) are clamped.
pub fn distance_to_similarity(distance: f32) -> f32 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

/// A record matched by vector search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticHit {
    /// Record identifier.
    pub id: String,
    /// Grouping key.
    pub key: RecordKey,
    /// Raw cosine distance.
    pub distance: f32,
    /// Similarity in `[0, 1]`.
    pub similarity: f32,
}

/// Hits of one semantic search, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticMatches {
    /// Hits at or above the similarity floor.
    pub hits: Vec<SemanticHit>,
    /// Whether the query embedding came from cache.
    pub cache_hit: bool,
}

/// Nearest-neighbor search using cached query embeddings.
pub struct VectorSearch {
    store: Arc<dyn CatalogStore>,
    cache: Arc<EmbeddingCache>,
}

impl VectorSearch {
    /// Create a vector search over `store`.
    pub fn new(store: Arc<dyn CatalogStore>, cache: Arc<EmbeddingCache>) -> Self {
        Self { store, cache }
    }

    /// The embedding cache used for query vectors.
    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Rank records by similarity to `query`.
    ///
    /// The store returns at most `limit` rows ordered by ascending distance;
    /// rows below `min_similarity` are then dropped, so fewer than `limit`
    /// hits may come back.
    pub async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
        min_similarity: f32,
    ) -> Result<SemanticMatches> {
        if limit == 0 {
            return Ok(SemanticMatches::default());
        }

        let (vector, source) = self.cache.lookup(query).await?;
        let neighbors = self.store.nearest(&vector, limit, filters, None).await?;

        let hits = neighbors
            .into_iter()
            .map(|n| SemanticHit {
                similarity: distance_to_similarity(n.distance),
                distance: n.distance,
                id: n.id,
                key: n.key,
            })
            .filter(|hit| hit.similarity >= min_similarity)
            .collect::<Vec<_>>();

        log::debug!(
            "Semantic search returned {} hits (limit {limit}, min {min_similarity})",
            hits.len()
        );
        Ok(SemanticMatches {
            hits,
            cache_hit: source.is_hit(),
        })
    }

    /// Records closest to `record_id`'s stored vector, excluding itself.
    pub async fn find_similar(&self, record_id: &str, limit: usize) -> Result<Vec<SemanticHit>> {
        let record = self
            .store
            .get(record_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("record {record_id}")))?;
        let vector = record
            .embedding
            .ok_or_else(|| Error::not_found(format!("embedding for record {record_id}")))?;

        if limit == 0 {
            return Ok(Vec::new());
        }

        let neighbors = self
            .store
            .nearest(&vector, limit, &SearchFilters::none(), Some(record_id))
            .await?;

        Ok(neighbors
            .into_iter()
            .map(|n| SemanticHit {
                similarity: distance_to_similarity(n.distance),
                distance: n.distance,
                id: n.id,
                key: n.key,
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

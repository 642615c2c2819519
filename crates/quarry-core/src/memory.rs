//! In-memory implementations of the seam traits.
//!
//! `MemoryCatalogStore` computes exact nearest neighbors by brute force and
//! `MemoryPersistentCache` honours TTLs against the tokio clock, so both are
//! usable in paused-time tests. Each can be switched into a failing mode to
//! exercise error paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::text::cosine_distance;
use crate::traits::{CatalogStore, PersistentCache};
use crate::types::{
    CatalogRecord, EmbeddingCoverage, EmbeddingInput, EmbeddingUpdate, KeywordCandidate, Neighbor,
    RecordKey, SearchFilters,
};
use crate::{Error, Result};

// ============================================================================
// MemoryCatalogStore
// ============================================================================

/// Catalog store backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    records: RwLock<BTreeMap<String, CatalogRecord>>,
    next_id: AtomicU64,
    fail_writes: AtomicBool,
    transactions: AtomicUsize,
}

impl MemoryCatalogStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records.
    pub fn with_records(records: impl IntoIterator<Item = CatalogRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.write();
            for record in records {
                map.insert(record.id.clone(), record);
            }
        }
        store
    }

    /// Make every subsequent `write_embeddings` call fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of committed embedding transactions.
    pub fn committed_transactions(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Next `rec-N` identifier not already present in `map`.
    fn allocate_id(&self, map: &BTreeMap<String, CatalogRecord>) -> String {
        loop {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let id = format!("rec-{n}");
            if !map.contains_key(&id) {
                return id;
            }
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn get(&self, id: &str) -> Result<Option<CatalogRecord>> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn get_by_key(&self, key: &RecordKey) -> Result<Option<CatalogRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .find(|r| &r.key == key)
            .cloned())
    }

    async fn upsert(&self, mut record: CatalogRecord) -> Result<String> {
        let mut map = self.records.write();

        let existing = map.values().find(|r| r.key == record.key).cloned();
        if let Some(existing) = existing {
            record.id = existing.id.clone();
            if record.embedding.is_none() {
                record.embedding = existing.embedding;
                record.embedding_updated_at = existing.embedding_updated_at;
            }
        } else if record.id.is_empty() || map.contains_key(&record.id) {
            record.id = self.allocate_id(&map);
        }

        let id = record.id.clone();
        map.insert(id.clone(), record);
        Ok(id)
    }

    async fn ids_missing_embedding(&self) -> Result<Vec<String>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.embedding.is_none())
            .map(|r| r.id.clone())
            .collect())
    }

    async fn ids_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.embedding_updated_at.is_none_or(|at| at < cutoff))
            .map(|r| r.id.clone())
            .collect())
    }

    async fn all_ids(&self) -> Result<Vec<String>> {
        Ok(self.records.read().keys().cloned().collect())
    }

    async fn fetch_embedding_inputs(&self, ids: &[String]) -> Result<Vec<EmbeddingInput>> {
        let map = self.records.read();
        Ok(ids
            .iter()
            .filter_map(|id| map.get(id))
            .map(CatalogRecord::embedding_input)
            .collect())
    }

    async fn write_embeddings(
        &self,
        updates: &[EmbeddingUpdate],
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::persistence("memory store: writes disabled"));
        }

        let mut map = self.records.write();
        if let Some(missing) = updates.iter().find(|u| !map.contains_key(&u.id)) {
            return Err(Error::persistence(format!(
                "memory store: record {} vanished mid-transaction",
                missing.id
            )));
        }

        for update in updates {
            if let Some(record) = map.get_mut(&update.id) {
                record.embedding = Some(update.embedding.clone());
                record.embedding_updated_at = Some(updated_at);
            }
        }
        self.transactions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nearest(
        &self,
        vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
        exclude_id: Option<&str>,
    ) -> Result<Vec<Neighbor>> {
        let map = self.records.read();
        let mut neighbors: Vec<Neighbor> = map
            .values()
            .filter(|r| exclude_id != Some(r.id.as_str()))
            .filter(|r| filters.matches(r))
            .filter_map(|r| {
                r.embedding.as_ref().map(|embedding| Neighbor {
                    id: r.id.clone(),
                    key: r.key.clone(),
                    distance: cosine_distance(vector, embedding),
                })
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        neighbors.truncate(limit);
        Ok(neighbors)
    }

    async fn keyword_candidates(&self, filters: &SearchFilters) -> Result<Vec<KeywordCandidate>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| filters.matches(r))
            .map(|r| KeywordCandidate {
                id: r.id.clone(),
                key: r.key.clone(),
                keywords: r.keywords.clone(),
            })
            .collect())
    }

    async fn coverage(&self) -> Result<EmbeddingCoverage> {
        let map = self.records.read();
        Ok(EmbeddingCoverage {
            total: map.len(),
            with_embedding: map.values().filter(|r| r.embedding.is_some()).count(),
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// MemoryPersistentCache
// ============================================================================

/// Persistent-cache stand-in with TTL expiry.
#[derive(Debug, Default)]
pub struct MemoryPersistentCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    unavailable: AtomicBool,
}

impl MemoryPersistentCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored (possibly expired) entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::persistence("memory cache: unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PersistentCache for MemoryPersistentCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check_available()?;
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        self.check_available()?;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok((before - entries.len()) as u64)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Match `text` against a glob with `*` wildcards (Redis `KEYS` subset).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

// ============================================================================
// Tests
// ============================================================================

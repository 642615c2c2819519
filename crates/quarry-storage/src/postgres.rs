//! Postgres + pgvector catalog store.
//!
//! Records live in one table keyed by `id` with a unique
//! `(organization, program)` grouping key. Embeddings are stored in a
//! `vector(D)` column and compared with the cosine-distance operator `<=>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quarry_core::{
    CatalogRecord, CatalogStore, EmbeddingCoverage, EmbeddingInput, EmbeddingUpdate, Error,
    KeywordCandidate, Neighbor, RecordKey, Result, SearchFilters,
};
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::{FromRow, QueryBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::config::StoreConfig;
use crate::index::PgIndexBackend;
use crate::pgvector::{parse_pg_vector, vector_to_pg};

/// Map a driver error to `Persistence`.
pub(crate) fn pg_err(e: sqlx::Error) -> Error {
    Error::persistence(format!("postgres: {e}"))
}

/// Per-process search session settings shared by the store and the index
/// backend. `0` means "server default".
#[derive(Debug, Default)]
pub(crate) struct SessionSettings {
    ef_search: AtomicU32,
}

impl SessionSettings {
    pub(crate) fn set_ef_search(&self, ef_search: u32) {
        self.ef_search.store(ef_search, Ordering::Relaxed);
    }

    pub(crate) fn ef_search(&self) -> Option<u32> {
        match self.ef_search.load(Ordering::Relaxed) {
            0 => None,
            ef => Some(ef),
        }
    }
}

const RECORD_COLUMNS: &str = "id, organization, program, description, category, location, \
     features, keywords, embedding::text AS embedding_text, embedding_updated_at";

#[derive(Debug, FromRow)]
struct RecordRow {
    id: String,
    organization: String,
    program: String,
    description: String,
    category: Option<String>,
    location: Option<String>,
    features: Vec<String>,
    keywords: Vec<String>,
    embedding_text: Option<String>,
    embedding_updated_at: Option<DateTime<Utc>>,
}

impl RecordRow {
    fn into_record(self) -> Result<CatalogRecord> {
        let embedding = self
            .embedding_text
            .as_deref()
            .map(parse_pg_vector)
            .transpose()?;
        Ok(CatalogRecord {
            id: self.id,
            key: RecordKey::new(self.organization, self.program),
            description: self.description,
            category: self.category,
            location: self.location,
            features: self.features,
            keywords: self.keywords,
            embedding,
            embedding_updated_at: self.embedding_updated_at,
        })
    }

    fn into_input(self) -> EmbeddingInput {
        EmbeddingInput {
            id: self.id,
            key: RecordKey::new(self.organization, self.program),
            description: self.description,
            category: self.category,
            location: self.location,
            features: self.features,
            keywords: self.keywords,
        }
    }
}

#[derive(Debug, FromRow)]
struct NeighborRow {
    id: String,
    organization: String,
    program: String,
    distance: f64,
}

#[derive(Debug, FromRow)]
struct KeywordRow {
    id: String,
    organization: String,
    program: String,
    keywords: Vec<String>,
}

/// [`CatalogStore`] backed by Postgres with the pgvector extension.
pub struct PgCatalogStore {
    pool: PgPool,
    table: String,
    session: Arc<SessionSettings>,
}

impl PgCatalogStore {
    /// Open a pool using `config.database_url`.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| Error::config("store.database_url is not set"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(url)
            .await
            .map_err(pg_err)?;
        log::info!(
            "Connected to Postgres (table '{}', pool size {})",
            config.table,
            config.max_connections
        );
        Ok(Self::from_pool(pool, &config.table))
    }

    /// Wrap an existing pool. `table` must already be validated.
    pub fn from_pool(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
            session: Arc::new(SessionSettings::default()),
        }
    }

    /// Underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Index backend sharing this store's pool and session settings.
    pub fn index_backend(&self) -> PgIndexBackend {
        PgIndexBackend::new(self.pool.clone(), self.table.clone(), Arc::clone(&self.session))
    }

    /// Create the pgvector extension and the catalog table if missing.
    pub async fn migrate(&self, dimension: usize) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(pg_err)?;

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                organization TEXT NOT NULL,
                program TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category TEXT,
                location TEXT,
                features TEXT[] NOT NULL DEFAULT '{{}}',
                keywords TEXT[] NOT NULL DEFAULT '{{}}',
                embedding vector({dimension}),
                embedding_updated_at TIMESTAMPTZ,
                UNIQUE (organization, program)
            )",
            table = self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await.map_err(pg_err)?;
        log::info!("Ensured table '{}' with vector({dimension})", self.table);
        Ok(())
    }

    async fn fetch_records(
        &self,
        builder: &mut QueryBuilder<'_, Postgres>,
    ) -> Result<Vec<CatalogRecord>> {
        builder
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(pg_err)?
            .into_iter()
            .map(RecordRow::into_record)
            .collect()
    }

    async fn fetch_ids(&self, builder: &mut QueryBuilder<'_, Postgres>) -> Result<Vec<String>> {
        builder
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await
            .map_err(pg_err)
    }
}

/// Append `AND column = $n` for each set filter.
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &SearchFilters) {
    if let Some(organization) = &filters.organization {
        builder.push(" AND organization = ").push_bind(organization.clone());
    }
    if let Some(category) = &filters.category {
        builder.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(location) = &filters.location {
        builder.push(" AND location = ").push_bind(location.clone());
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_usize(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn get(&self, id: &str) -> Result<Option<CatalogRecord>> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM {} WHERE id = ",
            self.table
        ));
        builder.push_bind(id.to_string());
        Ok(self.fetch_records(&mut builder).await?.into_iter().next())
    }

    async fn get_by_key(&self, key: &RecordKey) -> Result<Option<CatalogRecord>> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM {} WHERE organization = ",
            self.table
        ));
        builder
            .push_bind(key.organization.clone())
            .push(" AND program = ")
            .push_bind(key.program.clone());
        Ok(self.fetch_records(&mut builder).await?.into_iter().next())
    }

    async fn upsert(&self, record: CatalogRecord) -> Result<String> {
        let sql = format!(
            "INSERT INTO {t} AS r (id, organization, program, description, category, location,
                 features, keywords, embedding, embedding_updated_at)
             VALUES (COALESCE(NULLIF($1, ''), gen_random_uuid()::text), $2, $3, $4, $5, $6,
                 $7, $8, $9::text::vector, $10)
             ON CONFLICT (organization, program) DO UPDATE SET
                 description = EXCLUDED.description,
                 category = EXCLUDED.category,
                 location = EXCLUDED.location,
                 features = EXCLUDED.features,
                 keywords = EXCLUDED.keywords,
                 embedding = COALESCE(EXCLUDED.embedding, r.embedding),
                 embedding_updated_at = CASE
                     WHEN EXCLUDED.embedding IS NULL THEN r.embedding_updated_at
                     ELSE EXCLUDED.embedding_updated_at
                 END
             RETURNING id",
            t = self.table
        );
        let embedding = record.embedding.as_deref().map(vector_to_pg);
        sqlx::query_scalar::<_, String>(&sql)
            .bind(record.id)
            .bind(record.key.organization)
            .bind(record.key.program)
            .bind(record.description)
            .bind(record.category)
            .bind(record.location)
            .bind(record.features)
            .bind(record.keywords)
            .bind(embedding)
            .bind(record.embedding_updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(pg_err)
    }

    async fn ids_missing_embedding(&self) -> Result<Vec<String>> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT id FROM {} WHERE embedding IS NULL ORDER BY id",
            self.table
        ));
        self.fetch_ids(&mut builder).await
    }

    async fn ids_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT id FROM {} WHERE embedding_updated_at IS NULL OR embedding_updated_at < ",
            self.table
        ));
        builder.push_bind(cutoff).push(" ORDER BY id");
        self.fetch_ids(&mut builder).await
    }

    async fn all_ids(&self) -> Result<Vec<String>> {
        let mut builder = QueryBuilder::new(format!("SELECT id FROM {} ORDER BY id", self.table));
        self.fetch_ids(&mut builder).await
    }

    async fn fetch_embedding_inputs(&self, ids: &[String]) -> Result<Vec<EmbeddingInput>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM {} WHERE id = ANY(",
            self.table
        ));
        builder.push_bind(ids.to_vec()).push(")");

        let mut by_id: HashMap<String, EmbeddingInput> = builder
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(pg_err)?
            .into_iter()
            .map(|row| (row.id.clone(), row.into_input()))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn write_embeddings(
        &self,
        updates: &[EmbeddingUpdate],
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = updates.iter().map(|u| u.id.clone()).collect();
        let vectors: Vec<String> = updates.iter().map(|u| vector_to_pg(&u.embedding)).collect();
        let sql = format!(
            "UPDATE {} AS r
             SET embedding = u.vec::vector, embedding_updated_at = $3
             FROM unnest($1::text[], $2::text[]) AS u(id, vec)
             WHERE r.id = u.id",
            self.table
        );

        let mut tx = self.pool.begin().await.map_err(pg_err)?;
        let affected = sqlx::query(&sql)
            .bind(&ids)
            .bind(&vectors)
            .bind(updated_at)
            .execute(&mut *tx)
            .await
            .map_err(pg_err)?
            .rows_affected();

        if affected != updates.len() as u64 {
            tx.rollback().await.map_err(pg_err)?;
            return Err(Error::persistence(format!(
                "expected to update {} records, matched {affected}; rolled back",
                updates.len()
            )));
        }
        tx.commit().await.map_err(pg_err)
    }

    async fn nearest(
        &self,
        vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
        exclude_id: Option<&str>,
    ) -> Result<Vec<Neighbor>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let literal = vector_to_pg(vector);

        let mut builder = QueryBuilder::new("SELECT id, organization, program, embedding <=> ");
        builder
            .push_bind(literal.clone())
            .push(format!(
                "::text::vector AS distance FROM {} WHERE embedding IS NOT NULL",
                self.table
            ));
        push_filters(&mut builder, filters);
        if let Some(exclude) = exclude_id {
            builder.push(" AND id <> ").push_bind(exclude.to_string());
        }
        builder
            .push(" ORDER BY embedding <=> ")
            .push_bind(literal)
            .push("::text::vector LIMIT ")
            .push_bind(to_i64(limit));

        let mut tx = self.pool.begin().await.map_err(pg_err)?;
        if let Some(ef) = self.session.ef_search() {
            sqlx::query(&format!("SET LOCAL hnsw.ef_search = {ef}"))
                .execute(&mut *tx)
                .await
                .map_err(pg_err)?;
        }
        let rows = builder
            .build_query_as::<NeighborRow>()
            .fetch_all(&mut *tx)
            .await
            .map_err(pg_err)?;
        tx.commit().await.map_err(pg_err)?;

        Ok(rows
            .into_iter()
            .map(|row| Neighbor {
                id: row.id,
                key: RecordKey::new(row.organization, row.program),
                distance: row.distance as f32,
            })
            .collect())
    }

    async fn keyword_candidates(&self, filters: &SearchFilters) -> Result<Vec<KeywordCandidate>> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT id, organization, program, keywords FROM {} WHERE cardinality(keywords) > 0",
            self.table
        ));
        push_filters(&mut builder, filters);
        builder.push(" ORDER BY id");

        Ok(builder
            .build_query_as::<KeywordRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(pg_err)?
            .into_iter()
            .map(|row| KeywordCandidate {
                id: row.id,
                key: RecordKey::new(row.organization, row.program),
                keywords: row.keywords,
            })
            .collect())
    }

    async fn coverage(&self) -> Result<EmbeddingCoverage> {
        let sql = format!("SELECT count(*), count(embedding) FROM {}", self.table);
        let (total, with_embedding) = sqlx::query_as::<_, (i64, i64)>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(pg_err)?;
        Ok(EmbeddingCoverage {
            total: to_usize(total),
            with_embedding: to_usize(with_embedding),
        })
    }

    async fn close(&self) {
        self.pool.close().await;
        log::info!("Closed Postgres pool");
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

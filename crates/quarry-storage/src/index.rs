//! pgvector HNSW index backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quarry_core::{Error, Result};
use quarry_index::{BuildProgress, IndexBackend, IndexDescriptor, IndexParams, IndexState, TableStats};
use sqlx::FromRow;
use sqlx::postgres::PgPool;
use std::sync::Arc;

use crate::config::is_identifier;
use crate::postgres::{SessionSettings, pg_err};

#[derive(Debug, FromRow)]
struct DescribeRow {
    valid: bool,
    building: bool,
    size_bytes: i64,
    definition: String,
}

#[derive(Debug, FromRow)]
struct ProgressRow {
    phase: String,
    blocks_done: i64,
    blocks_total: i64,
    tuples_done: i64,
    tuples_total: i64,
}

#[derive(Debug, FromRow)]
struct StatsRow {
    live_tuples: i64,
    dead_tuples: i64,
    last_analyze: Option<DateTime<Utc>>,
    last_vacuum: Option<DateTime<Utc>>,
}

/// [`IndexBackend`] issuing pgvector HNSW DDL and reading Postgres
/// statistics views.
///
/// Builds and drops use `CONCURRENTLY`, so they run outside a transaction
/// and never block readers. `set_ef_search` is held in process memory and
/// applied with `SET LOCAL` on each nearest-neighbor query of the owning
/// [`PgCatalogStore`](crate::PgCatalogStore).
pub struct PgIndexBackend {
    pool: PgPool,
    table: String,
    session: Arc<SessionSettings>,
}

impl PgIndexBackend {
    pub(crate) fn new(pool: PgPool, table: String, session: Arc<SessionSettings>) -> Self {
        Self {
            pool,
            table,
            session,
        }
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(pg_err)?;
        Ok(())
    }
}

fn check_name(name: &str) -> Result<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "index name '{name}' is not a plain identifier"
        )))
    }
}

/// Extract `m` and `ef_construction` from a `pg_get_indexdef` string.
pub fn parse_index_params(definition: &str) -> Option<IndexParams> {
    let with = definition.to_ascii_lowercase();
    let options = with.split_once("with (")?.1;
    let options = options.split_once(')')?.0;

    let mut m = None;
    let mut ef_construction = None;
    for option in options.split(',') {
        let Some((key, value)) = option.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('\'').parse::<u32>().ok();
        match key.trim() {
            "m" => m = value,
            "ef_construction" => ef_construction = value,
            _ => {}
        }
    }
    // pgvector defaults when options are omitted.
    Some(IndexParams {
        m: m.unwrap_or(16),
        ef_construction: ef_construction.unwrap_or(64),
    })
}

fn non_negative(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

#[async_trait]
impl IndexBackend for PgIndexBackend {
    async fn describe(&self, name: &str) -> Result<Option<IndexDescriptor>> {
        let row = sqlx::query_as::<_, DescribeRow>(
            "SELECT i.indisvalid AS valid,
                    EXISTS (
                        SELECT 1 FROM pg_stat_progress_create_index p
                        WHERE p.index_relid = c.oid
                    ) AS building,
                    pg_relation_size(c.oid) AS size_bytes,
                    pg_get_indexdef(c.oid) AS definition
             FROM pg_class c
             JOIN pg_index i ON i.indexrelid = c.oid
             WHERE c.relkind = 'i' AND c.relname = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let state = match (row.building, row.valid) {
            (true, _) => IndexState::Building,
            (false, true) => IndexState::Valid,
            (false, false) => IndexState::Invalid,
        };
        let stats = self.table_stats().await?;
        Ok(Some(IndexDescriptor {
            name: name.to_string(),
            params: parse_index_params(&row.definition),
            state,
            size_bytes: non_negative(row.size_bytes),
            last_maintenance: stats.last_maintenance(),
        }))
    }

    async fn create(&self, name: &str, params: &IndexParams) -> Result<()> {
        check_name(name)?;
        self.execute(&format!(
            "CREATE INDEX CONCURRENTLY {name} ON {table} \
             USING hnsw (embedding vector_cosine_ops) \
             WITH (m = {m}, ef_construction = {ef})",
            table = self.table,
            m = params.m,
            ef = params.ef_construction
        ))
        .await
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        check_name(name)?;
        self.execute(&format!("DROP INDEX CONCURRENTLY IF EXISTS {name}"))
            .await
    }

    async fn build_progress(&self, name: &str) -> Result<Option<BuildProgress>> {
        let row = sqlx::query_as::<_, ProgressRow>(
            "SELECT p.phase, p.blocks_done, p.blocks_total, p.tuples_done, p.tuples_total
             FROM pg_stat_progress_create_index p
             JOIN pg_class c ON c.oid = p.index_relid
             WHERE c.relname = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err)?;

        Ok(row.map(|row| {
            BuildProgress::new(
                row.phase,
                non_negative(row.blocks_done),
                non_negative(row.blocks_total),
                non_negative(row.tuples_done),
                non_negative(row.tuples_total),
            )
        }))
    }

    async fn table_stats(&self) -> Result<TableStats> {
        let row = sqlx::query_as::<_, StatsRow>(
            "SELECT n_live_tup AS live_tuples,
                    n_dead_tup AS dead_tuples,
                    GREATEST(last_analyze, last_autoanalyze) AS last_analyze,
                    GREATEST(last_vacuum, last_autovacuum) AS last_vacuum
             FROM pg_stat_user_tables
             WHERE relname = $1",
        )
        .bind(&self.table)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err)?;

        Ok(row
            .map(|row| TableStats {
                live_tuples: non_negative(row.live_tuples),
                dead_tuples: non_negative(row.dead_tuples),
                last_analyze: row.last_analyze,
                last_vacuum: row.last_vacuum,
            })
            .unwrap_or_default())
    }

    async fn analyze(&self) -> Result<()> {
        self.execute(&format!("ANALYZE {}", self.table)).await
    }

    async fn vacuum(&self, full: bool) -> Result<()> {
        let sql = if full {
            format!("VACUUM (FULL, ANALYZE) {}", self.table)
        } else {
            format!("VACUUM (ANALYZE) {}", self.table)
        };
        self.execute(&sql).await
    }

    async fn set_ef_search(&self, ef_search: u32) -> Result<()> {
        self.session.set_ef_search(ef_search);
        Ok(())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

//! Index lifecycle manager.
//!
//! Enforces the `Absent -> Building -> Valid | Invalid` state machine on top
//! of an [`IndexBackend`]. Builds run on a spawned task so `create` returns
//! as soon as the build has started; callers poll [`build_progress`] or
//! await [`wait_for_build`].
//!
//! [`build_progress`]: IndexLifecycleManager::build_progress
//! [`wait_for_build`]: IndexLifecycleManager::wait_for_build

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use quarry_core::{Error, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::backend::IndexBackend;
use crate::config::IndexConfig;
use crate::types::{BuildProgress, HealthReport, IndexDescriptor, IndexState, TableStats};

/// Valid range for `set_search_quality`.
pub const EF_SEARCH_RANGE: std::ops::RangeInclusive<u32> = 1..=1000;

type BuildSlot = Option<JoinHandle<Result<()>>>;

/// Create/drop/rebuild, health, and maintenance for the approximate index.
pub struct IndexLifecycleManager {
    backend: Arc<dyn IndexBackend>,
    config: IndexConfig,
    build: Mutex<BuildSlot>,
}

impl IndexLifecycleManager {
    /// Create a manager after validating `config`.
    pub fn new(backend: Arc<dyn IndexBackend>, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            build: Mutex::new(None),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Current state.
    pub async fn state(&self) -> Result<IndexState> {
        let mut slot = self.build.lock().await;
        self.current_state(&mut slot).await
    }

    /// Start a non-blocking build. Only valid from `Absent`.
    pub async fn create(&self) -> Result<()> {
        let mut slot = self.build.lock().await;
        let state = self.current_state(&mut slot).await?;
        if state != IndexState::Absent {
            return Err(Error::index_state(format!(
                "cannot create index '{}' while {state}",
                self.config.name
            )));
        }
        self.spawn_build(&mut slot, state);
        Ok(())
    }

    /// Drop the index. Fails when `Absent` or while `Building`.
    pub async fn drop(&self) -> Result<()> {
        let mut slot = self.build.lock().await;
        let state = self.current_state(&mut slot).await?;
        match state {
            IndexState::Absent => Err(Error::index_state(format!(
                "cannot drop index '{}': no index exists",
                self.config.name
            ))),
            IndexState::Building => Err(Error::index_state(format!(
                "cannot drop index '{}' while a build is in progress",
                self.config.name
            ))),
            IndexState::Valid | IndexState::Invalid => {
                self.backend.drop_index(&self.config.name).await?;
                log::info!("Index '{}': {state} -> absent", self.config.name);
                Ok(())
            }
        }
    }

    /// Drop then create. Only valid from `Valid` or `Invalid`.
    pub async fn rebuild(&self) -> Result<()> {
        let mut slot = self.build.lock().await;
        let state = self.current_state(&mut slot).await?;
        if !matches!(state, IndexState::Valid | IndexState::Invalid) {
            return Err(Error::index_state(format!(
                "cannot rebuild index '{}' while {state}",
                self.config.name
            )));
        }
        self.backend.drop_index(&self.config.name).await?;
        log::info!("Index '{}': {state} -> absent (rebuild)", self.config.name);
        self.spawn_build(&mut slot, IndexState::Absent);
        Ok(())
    }

    /// Wait for an in-flight build started by this manager, then return
    /// the resulting state. Returns the current state immediately when no
    /// build is running.
    pub async fn wait_for_build(&self) -> Result<IndexState> {
        let handle = self.build.lock().await.take();
        if let Some(handle) = handle {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => {
                    return Err(Error::persistence(format!("index build task failed: {e}")));
                }
            }
        }
        self.state().await
    }

    /// Build progress while `Building`, otherwise `None`.
    pub async fn build_progress(&self) -> Result<Option<BuildProgress>> {
        if self.state().await? != IndexState::Building {
            return Ok(None);
        }
        self.backend.build_progress(&self.config.name).await
    }

    /// Snapshot of index state, table statistics, and advisory
    /// recommendations.
    pub async fn health_report(&self) -> Result<HealthReport> {
        let state = self.state().await?;
        let index = self.backend.describe(&self.config.name).await?;
        let stats = self.backend.table_stats().await?;
        let build_progress = if state == IndexState::Building {
            self.backend.build_progress(&self.config.name).await?
        } else {
            None
        };
        let recommendations =
            recommendations(&self.config, state, index.as_ref(), &stats, Utc::now());

        Ok(HealthReport {
            has_index: state != IndexState::Absent,
            state,
            index,
            stats,
            build_progress,
            recommendations,
        })
    }

    /// Refresh planner statistics.
    pub async fn analyze(&self) -> Result<()> {
        self.backend.analyze().await?;
        log::info!("Analyzed table for index '{}'", self.config.name);
        Ok(())
    }

    /// Reclaim dead-tuple space.
    ///
    /// `full = true` takes an exclusive lock for the duration and should be
    /// scheduled off-peak.
    pub async fn vacuum(&self, full: bool) -> Result<()> {
        if full {
            log::warn!("Running VACUUM FULL; the table is locked until it completes");
        }
        self.backend.vacuum(full).await?;
        log::info!(
            "Vacuumed table for index '{}' (full: {full})",
            self.config.name
        );
        Ok(())
    }

    /// Adjust the query-time recall/latency tradeoff for this session only.
    pub async fn set_search_quality(&self, ef_search: u32) -> Result<()> {
        if !EF_SEARCH_RANGE.contains(&ef_search) {
            return Err(Error::validation(format!(
                "ef_search must be in {}..={}, got {ef_search}",
                EF_SEARCH_RANGE.start(),
                EF_SEARCH_RANGE.end()
            )));
        }
        self.backend.set_ef_search(ef_search).await?;
        log::debug!("Set ef_search = {ef_search}");
        Ok(())
    }

    async fn current_state(&self, slot: &mut BuildSlot) -> Result<IndexState> {
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(IndexState::Building);
        }
        if let Some(handle) = slot.take() {
            // Outcome was already logged by the build task.
            let _ = handle.await;
        }
        Ok(self
            .backend
            .describe(&self.config.name)
            .await?
            .map_or(IndexState::Absent, |index| index.state))
    }

    fn spawn_build(&self, slot: &mut BuildSlot, from: IndexState) {
        let backend = Arc::clone(&self.backend);
        let name = self.config.name.clone();
        let params = self.config.params();

        log::info!(
            "Index '{name}': {from} -> building (m = {}, ef_construction = {})",
            params.m,
            params.ef_construction
        );
        *slot = Some(tokio::spawn(async move {
            let result = backend.create(&name, &params).await;
            match &result {
                Ok(()) => log::info!("Index '{name}': building -> valid"),
                Err(e) => log::warn!("Index '{name}': building -> invalid ({e})"),
            }
            result
        }));
    }
}

/// Advisory recommendations from fixed rules.
pub fn recommendations(
    config: &IndexConfig,
    state: IndexState,
    index: Option<&IndexDescriptor>,
    stats: &TableStats,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut out = Vec::new();

    match state {
        IndexState::Absent => out.push(format!(
            "No vector index exists; create '{}' to enable approximate search",
            config.name
        )),
        IndexState::Invalid => out.push(format!(
            "Index '{}' is invalid (failed or interrupted build); rebuild it",
            config.name
        )),
        IndexState::Building | IndexState::Valid => {}
    }

    let stale_cutoff = now - ChronoDuration::days(i64::from(config.stale_stats_days));
    match stats.last_analyze {
        None => out.push("Table statistics have never been collected; run ANALYZE".to_string()),
        Some(at) if at < stale_cutoff => out.push(format!(
            "Table statistics are older than {} days (last ANALYZE {}); run ANALYZE",
            config.stale_stats_days,
            at.format("%Y-%m-%d")
        )),
        Some(_) => {}
    }

    if let Some(index) = index.filter(|i| i.size_bytes > config.large_index_bytes) {
        out.push(format!(
            "Index '{}' is unusually large ({:.2} GiB); schedule VACUUM or a rebuild off-peak",
            index.name,
            index.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
        ));
    }

    let ratio = stats.dead_tuple_ratio();
    if ratio > config.dead_tuple_ratio {
        out.push(format!(
            "Dead tuples are {:.0}% of the table; run VACUUM",
            ratio * 100.0
        ));
    }

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::MemoryIndexBackend;
    use std::time::Duration;

    fn manager_with(backend: Arc<MemoryIndexBackend>) -> IndexLifecycleManager {
        IndexLifecycleManager::new(backend, IndexConfig::default()).unwrap()
    }

    fn fresh_stats() -> TableStats {
        TableStats {
            live_tuples: 100,
            dead_tuples: 0,
            last_analyze: Some(Utc::now()),
            last_vacuum: None,
        }
    }

    #[tokio::test]
    async fn test_create_then_valid() {
        let backend = Arc::new(MemoryIndexBackend::new());
        let manager = manager_with(backend);
        assert_eq!(manager.state().await.unwrap(), IndexState::Absent);

        manager.create().await.unwrap();
        assert_eq!(manager.wait_for_build().await.unwrap(), IndexState::Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_is_non_blocking() {
        let backend =
            Arc::new(MemoryIndexBackend::new().with_build_duration(Duration::from_secs(60)));
        backend.set_table_stats(fresh_stats());
        let manager = manager_with(backend);

        manager.create().await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(manager.state().await.unwrap(), IndexState::Building);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let progress = manager.build_progress().await.unwrap().unwrap();
        assert!(progress.percent > 0.0 && progress.percent < 100.0);

        let report = manager.health_report().await.unwrap();
        assert!(report.has_index);
        assert!(report.build_progress.is_some());

        assert_eq!(manager.wait_for_build().await.unwrap(), IndexState::Valid);
        assert!(manager.build_progress().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitions_rejected_while_building() {
        let backend =
            Arc::new(MemoryIndexBackend::new().with_build_duration(Duration::from_secs(60)));
        let manager = manager_with(backend);
        manager.create().await.unwrap();

        assert!(matches!(
            manager.create().await.unwrap_err(),
            Error::IndexState(_)
        ));
        assert!(matches!(manager.drop().await.unwrap_err(), Error::IndexState(_)));
        assert!(matches!(
            manager.rebuild().await.unwrap_err(),
            Error::IndexState(_)
        ));
        manager.wait_for_build().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_twice_rejected() {
        let manager = manager_with(Arc::new(MemoryIndexBackend::new()));
        manager.create().await.unwrap();
        manager.wait_for_build().await.unwrap();
        let err = manager.create().await.unwrap_err();
        assert!(matches!(err, Error::IndexState(_)));
    }

    #[tokio::test]
    async fn test_drop_when_absent_is_index_state_error() {
        let manager = manager_with(Arc::new(MemoryIndexBackend::new()));
        let err = manager.drop().await.unwrap_err();
        assert!(matches!(err, Error::IndexState(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_drop_returns_to_absent() {
        let manager = manager_with(Arc::new(MemoryIndexBackend::new()));
        manager.create().await.unwrap();
        manager.wait_for_build().await.unwrap();
        manager.drop().await.unwrap();
        assert_eq!(manager.state().await.unwrap(), IndexState::Absent);
    }

    #[tokio::test]
    async fn test_failed_build_is_invalid_then_rebuild() {
        let backend = Arc::new(MemoryIndexBackend::new());
        backend.fail_next_build();
        let manager = manager_with(backend);

        manager.create().await.unwrap();
        assert!(manager.wait_for_build().await.is_err());
        assert_eq!(manager.state().await.unwrap(), IndexState::Invalid);

        manager.rebuild().await.unwrap();
        assert_eq!(manager.wait_for_build().await.unwrap(), IndexState::Valid);
    }

    #[tokio::test]
    async fn test_rebuild_from_absent_rejected() {
        let manager = manager_with(Arc::new(MemoryIndexBackend::new()));
        let err = manager.rebuild().await.unwrap_err();
        assert!(matches!(err, Error::IndexState(_)));
    }

    #[tokio::test]
    async fn test_health_report_without_index() {
        let backend = Arc::new(MemoryIndexBackend::new());
        backend.set_table_stats(fresh_stats());
        let manager = manager_with(backend);

        let report = manager.health_report().await.unwrap();
        assert!(!report.has_index);
        assert_eq!(report.state, IndexState::Absent);
        assert!(report.index.is_none());
        assert!(report.build_progress.is_none());
        assert_eq!(report.recommendations.len(), 1);
        assert!(report.recommendations[0].contains("No vector index"));
    }

    #[tokio::test]
    async fn test_health_report_healthy_index_has_no_recommendations() {
        let backend = Arc::new(MemoryIndexBackend::new());
        backend.set_table_stats(fresh_stats());
        let manager = manager_with(backend);
        manager.create().await.unwrap();
        manager.wait_for_build().await.unwrap();

        let report = manager.health_report().await.unwrap();
        assert!(report.has_index);
        assert_eq!(report.state, IndexState::Valid);
        assert!(report.recommendations.is_empty(), "{:?}", report.recommendations);
    }

    #[test]
    fn test_recommendation_rules() {
        let config = IndexConfig::default();
        let now = Utc::now();
        let index = IndexDescriptor {
            name: config.name.clone(),
            params: Some(config.params()),
            state: IndexState::Valid,
            size_bytes: 2 * config.large_index_bytes,
            last_maintenance: None,
        };
        let stats = TableStats {
            live_tuples: 70,
            dead_tuples: 30,
            last_analyze: Some(now - ChronoDuration::days(10)),
            last_vacuum: None,
        };

        let recs = recommendations(&config, IndexState::Valid, Some(&index), &stats, now);
        assert_eq!(recs.len(), 3, "{recs:?}");
        assert!(recs[0].contains("older than 7 days"));
        assert!(recs[1].contains("unusually large"));
        assert!(recs[2].contains("30%"));
    }

    #[test]
    fn test_recommendation_invalid_index() {
        let config = IndexConfig::default();
        let now = Utc::now();
        let stats = TableStats {
            last_analyze: Some(now),
            ..Default::default()
        };
        let recs = recommendations(&config, IndexState::Invalid, None, &stats, now);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("invalid"));
    }

    #[test]
    fn test_never_analyzed_is_stale() {
        let config = IndexConfig::default();
        let recs = recommendations(
            &config,
            IndexState::Valid,
            None,
            &TableStats::default(),
            Utc::now(),
        );
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("ANALYZE"));
    }

    #[tokio::test]
    async fn test_maintenance_clears_recommendations() {
        let backend = Arc::new(MemoryIndexBackend::new());
        backend.set_table_stats(TableStats {
            live_tuples: 50,
            dead_tuples: 50,
            ..Default::default()
        });
        let manager = manager_with(backend);
        manager.create().await.unwrap();
        manager.wait_for_build().await.unwrap();
        assert_eq!(manager.health_report().await.unwrap().recommendations.len(), 2);

        manager.analyze().await.unwrap();
        manager.vacuum(false).await.unwrap();
        assert!(manager.health_report().await.unwrap().recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_set_search_quality() {
        let backend = Arc::new(MemoryIndexBackend::new());
        let manager = manager_with(backend.clone());

        manager.set_search_quality(200).await.unwrap();
        assert_eq!(backend.ef_search(), Some(200));

        for bad in [0, 1001] {
            let err = manager.set_search_quality(bad).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
        assert_eq!(backend.ef_search(), Some(200));
    }
}

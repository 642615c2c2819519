//! The `IndexBackend` seam and an in-memory implementation.
//!
//! A backend performs the physical work (DDL, catalog queries, maintenance
//! commands). It does not enforce the state machine; that is the job of
//! [`IndexLifecycleManager`](crate::IndexLifecycleManager).

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use quarry_core::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::types::{BuildProgress, IndexDescriptor, IndexParams, IndexState, TableStats};

/// Physical operations on the approximate index and its table.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Describe the named index, or `None` if it does not exist.
    async fn describe(&self, name: &str) -> Result<Option<IndexDescriptor>>;

    /// Build the index without locking out readers.
    ///
    /// Resolves when the build finishes. On failure the backend may leave
    /// an `Invalid` index behind.
    async fn create(&self, name: &str, params: &IndexParams) -> Result<()>;

    /// Drop the index without locking out readers.
    async fn drop_index(&self, name: &str) -> Result<()>;

    /// Progress of an in-flight build of `name`, if any.
    async fn build_progress(&self, name: &str) -> Result<Option<BuildProgress>>;

    /// Statistics for the indexed table.
    async fn table_stats(&self) -> Result<TableStats>;

    /// Refresh planner statistics.
    async fn analyze(&self) -> Result<()>;

    /// Reclaim dead-tuple space; `full` rewrites the table under an
    /// exclusive lock.
    async fn vacuum(&self, full: bool) -> Result<()>;

    /// Set the query-time candidate-list size for the current session.
    async fn set_ef_search(&self, ef_search: u32) -> Result<()>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Default)]
struct Inner {
    index: Option<IndexDescriptor>,
    build_started: Option<Instant>,
    stats: TableStats,
    index_size_bytes: u64,
    ef_search: Option<u32>,
}

/// In-memory [`IndexBackend`] that simulates a timed build.
///
/// Used by tests and by the umbrella crate when no database is configured.
pub struct MemoryIndexBackend {
    inner: Mutex<Inner>,
    build_duration: Duration,
    fail_next_build: AtomicBool,
}

impl Default for MemoryIndexBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndexBackend {
    /// Backend whose builds complete immediately.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            build_duration: Duration::ZERO,
            fail_next_build: AtomicBool::new(false),
        }
    }

    /// Make each build take `duration`.
    pub fn with_build_duration(mut self, duration: Duration) -> Self {
        self.build_duration = duration;
        self
    }

    /// Make the next build fail and leave an `Invalid` index.
    pub fn fail_next_build(&self) {
        self.fail_next_build.store(true, Ordering::SeqCst);
    }

    /// Replace the reported table statistics.
    pub fn set_table_stats(&self, stats: TableStats) {
        self.inner.lock().stats = stats;
    }

    /// Size reported for a built index.
    pub fn set_index_size(&self, bytes: u64) {
        let mut inner = self.inner.lock();
        inner.index_size_bytes = bytes;
        if let Some(index) = inner.index.as_mut() {
            index.size_bytes = bytes;
        }
    }

    /// Last value passed to `set_ef_search`.
    pub fn ef_search(&self) -> Option<u32> {
        self.inner.lock().ef_search
    }

    fn touch_maintenance(inner: &mut Inner) {
        let last = inner.stats.last_maintenance();
        if let Some(index) = inner.index.as_mut() {
            index.last_maintenance = last;
        }
    }
}

#[async_trait]
impl IndexBackend for MemoryIndexBackend {
    async fn describe(&self, name: &str) -> Result<Option<IndexDescriptor>> {
        Ok(self
            .inner
            .lock()
            .index
            .as_ref()
            .filter(|index| index.name == name)
            .cloned())
    }

    async fn create(&self, name: &str, params: &IndexParams) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.index.is_some() {
                return Err(Error::persistence(format!(
                    "relation \"{name}\" already exists"
                )));
            }
            inner.index = Some(IndexDescriptor {
                name: name.to_string(),
                params: Some(*params),
                state: IndexState::Building,
                size_bytes: 0,
                last_maintenance: inner.stats.last_maintenance(),
            });
            inner.build_started = Some(Instant::now());
        }

        if !self.build_duration.is_zero() {
            tokio::time::sleep(self.build_duration).await;
        }

        let failed = self.fail_next_build.swap(false, Ordering::SeqCst);
        let mut inner = self.inner.lock();
        inner.build_started = None;
        let size = inner.index_size_bytes;
        let Some(index) = inner.index.as_mut().filter(|i| i.name == name) else {
            return Err(Error::persistence(format!(
                "index \"{name}\" disappeared during build"
            )));
        };
        if failed {
            index.state = IndexState::Invalid;
            return Err(Error::persistence(format!(
                "build of \"{name}\" failed"
            )));
        }
        index.state = IndexState::Valid;
        index.size_bytes = size;
        Ok(())
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.index.as_ref() {
            Some(index) if index.name == name => {
                inner.index = None;
                inner.build_started = None;
                Ok(())
            }
            _ => Err(Error::persistence(format!(
                "index \"{name}\" does not exist"
            ))),
        }
    }

    async fn build_progress(&self, name: &str) -> Result<Option<BuildProgress>> {
        let inner = self.inner.lock();
        let building = inner
            .index
            .as_ref()
            .is_some_and(|i| i.name == name && i.state == IndexState::Building);
        let Some(started) = inner.build_started.filter(|_| building) else {
            return Ok(None);
        };

        let total = inner.stats.live_tuples;
        let fraction = if self.build_duration.is_zero() {
            1.0
        } else {
            (started.elapsed().as_secs_f64() / self.build_duration.as_secs_f64()).min(1.0)
        };
        let done = (total as f64 * fraction) as u64;
        let mut progress = BuildProgress::new("building index", 0, 0, done, total);
        if total == 0 {
            progress.percent = fraction * 100.0;
        }
        Ok(Some(progress))
    }

    async fn table_stats(&self) -> Result<TableStats> {
        Ok(self.inner.lock().stats.clone())
    }

    async fn analyze(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.stats.last_analyze = Some(Utc::now());
        Self::touch_maintenance(&mut inner);
        Ok(())
    }

    async fn vacuum(&self, _full: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.stats.dead_tuples = 0;
        inner.stats.last_vacuum = Some(Utc::now());
        Self::touch_maintenance(&mut inner);
        Ok(())
    }

    async fn set_ef_search(&self, ef_search: u32) -> Result<()> {
        self.inner.lock().ef_search = Some(ef_search);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

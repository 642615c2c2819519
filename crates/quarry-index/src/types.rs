//! Index descriptors, table statistics, and health reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the approximate index.
///
/// ```text
/// Absent --create--> Building --ok--> Valid
///                        \--err--> Invalid
/// Valid | Invalid --rebuild--> Building
/// Valid | Invalid --drop--> Absent
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    /// No index exists.
    Absent,
    /// A non-blocking build is in progress.
    Building,
    /// Built and usable by the planner.
    Valid,
    /// Present but unusable (failed or interrupted build).
    Invalid,
}

impl IndexState {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Building => "building",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HNSW build parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    /// Max connections per node.
    pub m: u32,
    /// Construction candidate-list size.
    pub ef_construction: u32,
}

/// What the backend knows about an existing index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Index name.
    pub name: String,
    /// Build parameters, when the backend can report them.
    pub params: Option<IndexParams>,
    /// Current state; never `Absent` for a descriptor that exists.
    pub state: IndexState,
    /// On-disk size.
    pub size_bytes: u64,
    /// Most recent ANALYZE or VACUUM of the indexed table.
    pub last_maintenance: Option<DateTime<Utc>>,
}

/// Progress of an in-flight build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildProgress {
    /// Backend-specific phase label.
    pub phase: String,
    /// Blocks scanned.
    pub blocks_done: u64,
    /// Blocks to scan.
    pub blocks_total: u64,
    /// Tuples processed.
    pub tuples_done: u64,
    /// Tuples to process.
    pub tuples_total: u64,
    /// Percent complete in `[0, 100]`.
    pub percent: f64,
}

impl BuildProgress {
    /// Compute percent from blocks, falling back to tuples when the block
    /// counters are not populated for the current phase.
    pub fn new(
        phase: impl Into<String>,
        blocks_done: u64,
        blocks_total: u64,
        tuples_done: u64,
        tuples_total: u64,
    ) -> Self {
        let percent = if blocks_total > 0 {
            blocks_done as f64 / blocks_total as f64 * 100.0
        } else if tuples_total > 0 {
            tuples_done as f64 / tuples_total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            phase: phase.into(),
            blocks_done,
            blocks_total,
            tuples_done,
            tuples_total,
            percent: percent.clamp(0.0, 100.0),
        }
    }
}

/// Statistics for the indexed table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    /// Live rows.
    pub live_tuples: u64,
    /// Dead rows awaiting VACUUM.
    pub dead_tuples: u64,
    /// Last ANALYZE (manual or automatic).
    pub last_analyze: Option<DateTime<Utc>>,
    /// Last VACUUM (manual or automatic).
    pub last_vacuum: Option<DateTime<Utc>>,
}

impl TableStats {
    /// `dead / (live + dead)`, or 0 for an empty table.
    pub fn dead_tuple_ratio(&self) -> f64 {
        let total = self.live_tuples + self.dead_tuples;
        if total == 0 {
            0.0
        } else {
            self.dead_tuples as f64 / total as f64
        }
    }

    /// Most recent of `last_analyze` and `last_vacuum`.
    pub fn last_maintenance(&self) -> Option<DateTime<Utc>> {
        self.last_analyze.max(self.last_vacuum)
    }
}

/// Snapshot returned by the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Whether any index exists (in any state other than `Absent`).
    pub has_index: bool,
    /// Current state.
    pub state: IndexState,
    /// Descriptor, when an index exists.
    pub index: Option<IndexDescriptor>,
    /// Indexed-table statistics.
    pub stats: TableStats,
    /// Present only while `Building`.
    pub build_progress: Option<BuildProgress>,
    /// Advisory, human-readable suggestions.
    pub recommendations: Vec<String>,
}

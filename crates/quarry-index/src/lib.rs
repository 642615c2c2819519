//! Approximate nearest-neighbor index lifecycle for Quarry.
//!
//! # Modules
//!
//! - [`types`]: `IndexState`, descriptors, build progress, health reports
//! - [`backend`]: the `IndexBackend` seam and `MemoryIndexBackend`
//! - [`lifecycle`]: `IndexLifecycleManager` and the recommendation rules
//! - [`config`]: `IndexConfig`

pub mod backend;
pub mod config;
pub mod lifecycle;
pub mod types;

pub use backend::{IndexBackend, MemoryIndexBackend};
pub use config::IndexConfig;
pub use lifecycle::{EF_SEARCH_RANGE, IndexLifecycleManager, recommendations};
pub use types::{BuildProgress, HealthReport, IndexDescriptor, IndexParams, IndexState, TableStats};

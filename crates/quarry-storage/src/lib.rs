//! External-collaborator implementations for Quarry.
//!
//! - [`PgCatalogStore`]: Postgres + pgvector `CatalogStore`
//! - [`PgIndexBackend`]: HNSW `IndexBackend` over the same pool
//! - [`RedisPersistentCache`]: Redis `PersistentCache`
//! - [`StoreConfig`]: connection settings

pub mod cache;
pub mod config;
pub mod index;
pub mod pgvector;
pub mod postgres;

pub use cache::RedisPersistentCache;
pub use config::StoreConfig;
pub use index::{PgIndexBackend, parse_index_params};
pub use pgvector::{parse_pg_vector, vector_to_pg};
pub use postgres::PgCatalogStore;

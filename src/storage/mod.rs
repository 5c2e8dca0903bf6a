//! Observation persistence
//!
//! Observations are kept in an append-only SQLite log. Retention and
//! pruning are left to whoever operates the database file.

pub mod repository;

use anyhow::Result;

use crate::config::DatabaseConfig;

pub use repository::{
    create_memory_store, create_sqlite_store, MemoryTrendStore, SharedTrendStore,
    SqliteTrendStore, TrendStore,
};

/// Path that selects the in-memory store instead of a file
pub const MEMORY_PATH: &str = ":memory:";

/// Open the store described by the database configuration
pub fn open_store(config: &DatabaseConfig) -> Result<SharedTrendStore> {
    if config.path.as_os_str() == MEMORY_PATH {
        tracing::info!("Using in-memory trend store");
        return Ok(create_memory_store());
    }

    create_sqlite_store(&config.path)
}

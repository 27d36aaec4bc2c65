// # Memory Store
//
// In-memory implementation of every repository trait.
//
// ## Purpose
//
// Fast, volatile storage for tests and for deployments that re-import all
// zones from their cloud accounts on start-up.
//
// ## Crash Behavior
//
// - All rows are lost on restart/crash
// - Nothing is written to disk

use async_trait::async_trait;

use super::tables::{Persistence, TableStore, Tables};
use crate::error::Result;

/// Persistence that keeps nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct Volatile;

#[async_trait]
impl Persistence for Volatile {
    async fn save(&self, _tables: &Tables) -> Result<()> {
        Ok(())
    }
}

/// In-memory store
///
/// Cloning yields another handle onto the same tables.
///
/// # Example
///
/// ```rust,no_run
/// use dnssync_core::state::MemoryStore;
/// use dnssync_core::model::{DnsZone, ZoneType};
/// use dnssync_core::traits::ZoneStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///
///     let zone = store.insert_zone(DnsZone::new("example.com", ZoneType::PublicZone)).await?;
///     assert_eq!(store.get_zone(&zone.id).await?.name, "example.com");
///
///     Ok(())
/// }
/// ```
pub type MemoryStore = TableStore<Volatile>;

impl TableStore<Volatile> {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::from_parts(Tables::default(), Volatile)
    }

    /// Number of rows across all tables
    pub async fn len(&self) -> usize {
        self.snapshot().await.row_count()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for TableStore<Volatile> {
    fn default() -> Self {
        Self::new()
    }
}

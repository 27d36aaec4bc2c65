// # File Store
//
// File-backed implementation of every repository trait with crash recovery.
//
// ## Purpose
//
// Keeps zones, record sets, caches and traffic policies across daemon
// restarts, so a restart only has to re-diff against the providers.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good snapshot
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "tables": {
//     "next_id": 3,
//     "zones": { "zone-00000001": { "name": "example.com", ... } },
//     "record_sets": { ... },
//     "caches": { ... }
//   }
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::tables::{Persistence, TableStore, Tables};
use crate::error::{Error, Result};

/// Snapshot file format version
/// Used for future migration if format changes
const STORE_FILE_VERSION: &str = "1.0";

/// Serializable snapshot file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    tables: Tables,
}

/// Borrowed form of [`StoreFileFormat`] used when writing
#[derive(serde::Serialize)]
struct StoreFileRef<'a> {
    version: &'a str,
    tables: &'a Tables,
}

/// Persistence writing a JSON snapshot after every change
#[derive(Debug)]
pub struct JsonFile {
    path: PathBuf,
}

/// File-backed store
///
/// # Example
///
/// ```rust,no_run
/// use dnssync_core::state::FileStore;
/// use dnssync_core::model::{DnsZone, ZoneType};
/// use dnssync_core::traits::ZoneStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStore::open("/var/lib/dnssync/store.json").await?;
///
///     // Inserted row is atomically written to disk
///     store.insert_zone(DnsZone::new("example.com", ZoneType::PublicZone)).await?;
///
///     Ok(())
/// }
/// ```
pub type FileStore = TableStore<JsonFile>;

impl TableStore<JsonFile> {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Try to load the existing snapshot
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with empty tables
    /// 4. Create parent directories if needed
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let tables = JsonFile::load_with_recovery(&path).await?;

        Ok(Self::from_parts(tables, JsonFile { path }))
    }

    /// Path of the snapshot file
    pub fn path(&self) -> &Path {
        &self.persistence().path
    }
}

#[async_trait]
impl Persistence for JsonFile {
    async fn save(&self, tables: &Tables) -> Result<()> {
        self.write_snapshot(tables).await
    }
}

impl JsonFile {
    /// Load tables with automatic recovery
    ///
    /// A snapshot that fails to parse is treated as corrupted: the backup
    /// is loaded instead and copied over the corrupted file. Read errors
    /// other than corruption are returned.
    async fn load_with_recovery(path: &Path) -> Result<Tables> {
        let err = match Self::load(path).await {
            Ok(tables) => {
                tracing::debug!("Loaded store from file: {} rows", tables.row_count());
                return Ok(tables);
            }
            Err(err @ Error::Json(_)) => err,
            Err(err) => return Err(err),
        };

        tracing::warn!("Store file appears corrupted: {}. Attempting recovery from backup.", err);

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty store.");
            return Ok(Tables::default());
        }

        match Self::load(&backup_path).await {
            Ok(tables) => {
                tracing::info!("Recovered store from backup: {} rows", tables.row_count());
                if let Err(restore_err) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore store file from backup: {}", restore_err);
                }
                Ok(tables)
            }
            Err(backup_err) => {
                tracing::error!("Backup also corrupted: {}. Starting with empty store.", backup_err);
                Ok(Tables::default())
            }
        }
    }

    /// Load tables from a snapshot file
    async fn load(path: &Path) -> Result<Tables> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(Tables::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!("Failed to read store file {}: {}", path.display(), e))
        })?;

        let snapshot: StoreFileFormat = serde_json::from_str(&content)?;

        if snapshot.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                snapshot.version
            );
        }

        Ok(snapshot.tables)
    }

    /// Write a snapshot atomically
    async fn write_snapshot(&self, tables: &Tables) -> Result<()> {
        let json = serde_json::to_string_pretty(&StoreFileRef {
            version: STORE_FILE_VERSION,
            tables,
        })
        .map_err(|e| Error::store(format!("Failed to serialize store: {}", e)))?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!("Failed to create temp file {}: {}", temp_path.display(), e))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!("Failed to write to temp file {}: {}", temp_path.display(), e))
            })?;

            file.flush().await.map_err(|e| {
                Error::store(format!("Failed to flush temp file {}: {}", temp_path.display(), e))
            })?;
        }

        // Keep the previous snapshot as backup
        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

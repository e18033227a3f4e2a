//! Local metainfo service and transfer engine backed by fjall
//!
//! Implements the collaborator traits of `strand-core` against an embedded
//! keyspace so uploads can be exercised end to end without a network.

use fjall::{Config, Keyspace, PartitionCreateOptions, PersistMode};
use std::path::Path;
use std::sync::Arc;
use strand_core::*;

pub mod bucket;
pub mod metainfo;
pub mod transfer;

pub use bucket::*;
pub use metainfo::*;
pub use transfer::*;

/// Storage engine wrapping fjall keyspace
#[derive(Clone)]
pub struct StorageEngine {
    keyspace: Arc<Keyspace>,
    // Serializes read-modify-write sequences across partitions.
    write_lock: Arc<parking_lot::Mutex<()>>,
}

impl StorageEngine {
    /// Create new storage engine at the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::new(path);
        let keyspace = Arc::new(
            config
                .open()
                .map_err(|e| StrandError::Storage(e.to_string()))?
        );

        Ok(StorageEngine {
            keyspace,
            write_lock: Arc::new(parking_lot::Mutex::new(())),
        })
    }

    /// Create temporary storage engine for testing
    #[cfg(any(test, feature = "test-utils"))]
    pub fn temp() -> Result<(Self, tempfile::TempDir)> {
        let temp_dir = tempfile::tempdir()
            .map_err(|e| StrandError::Internal(e.to_string()))?;
        let engine = Self::new(temp_dir.path())?;
        Ok((engine, temp_dir))
    }

    /// Open the object partition of a bucket
    pub fn bucket(&self, name: &str) -> Result<Bucket> {
        Bucket::new(self.clone(), name)
    }

    pub(crate) fn partition(&self, name: &str) -> Result<fjall::PartitionHandle> {
        self.keyspace
            .open_partition(name, PartitionCreateOptions::default())
            .map_err(|e| StrandError::Storage(e.to_string()))
    }

    pub(crate) fn write_lock(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    /// Persist all changes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(|e| StrandError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_engine_creation() {
        let (engine, _temp) = StorageEngine::temp().unwrap();
        assert!(engine.persist().is_ok());
    }

    #[test]
    fn test_bucket_partition_names_are_safe() {
        let (engine, _temp) = StorageEngine::temp().unwrap();
        // Names outside fjall's partition alphabet still open fine.
        let bucket = engine.bucket("my.bucket with spaces").unwrap();
        assert_eq!(bucket.name(), "my.bucket with spaces");
    }
}

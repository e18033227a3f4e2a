//! Per-bucket object records over fjall partitions
//!
//! Key layout inside a bucket partition:
//!
//! ```text
//! obj\0{encrypted path}                  -> committed ObjectRecord
//! pend\0{encrypted path}\0{stream hex}   -> pending ObjectRecord
//! ```

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use strand_core::encryption::{EncryptionParameters, Nonce};
use strand_core::metainfo::{ObjectListItem, ObjectStatus, RawObjectItem};
use strand_core::*;
use crate::StorageEngine;

const COMMITTED_PREFIX: &[u8] = b"obj\0";
const PENDING_PREFIX: &[u8] = b"pend\0";

/// Stored form of an object, pending or committed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub encrypted_path: String,
    pub stream_id: StreamId,
    pub status: ObjectStatus,
    pub created: SystemTime,
    pub expires: Option<SystemTime>,
    pub plain_size: i64,
    pub encrypted_metadata_nonce: Vec<u8>,
    pub encrypted_metadata_encrypted_key: Vec<u8>,
    pub encrypted_metadata: Vec<u8>,
    pub encryption_parameters: EncryptionParameters,
}

impl ObjectRecord {
    pub fn into_raw(self, bucket: &str) -> Result<RawObjectItem> {
        Ok(RawObjectItem {
            bucket: bucket.to_string(),
            encrypted_metadata_nonce: nonce_from(&self.encrypted_metadata_nonce)?,
            encrypted_path: self.encrypted_path,
            stream_id: self.stream_id,
            status: self.status,
            created: self.created,
            expires: self.expires,
            plain_size: self.plain_size,
            encrypted_metadata_encrypted_key: self.encrypted_metadata_encrypted_key,
            encrypted_metadata: self.encrypted_metadata,
            encryption_parameters: self.encryption_parameters,
        })
    }

    /// Listing entry with `encrypted_path` made relative to `prefix`
    pub fn to_list_item(&self, prefix: &str, include_metadata: bool) -> Result<ObjectListItem> {
        let relative = self.encrypted_path.strip_prefix(prefix).unwrap_or(&self.encrypted_path);
        let (nonce, key, metadata) = if include_metadata {
            (
                nonce_from(&self.encrypted_metadata_nonce)?,
                self.encrypted_metadata_encrypted_key.clone(),
                self.encrypted_metadata.clone(),
            )
        } else {
            (Nonce::default(), Vec::new(), Vec::new())
        };

        Ok(ObjectListItem {
            encrypted_path: relative.to_string(),
            stream_id: Some(self.stream_id.clone()),
            status: self.status,
            is_prefix: false,
            created: Some(self.created),
            expires: self.expires,
            plain_size: self.plain_size,
            encrypted_metadata_nonce: nonce,
            encrypted_metadata_encrypted_key: key,
            encrypted_metadata: metadata,
        })
    }
}

fn nonce_from(bytes: &[u8]) -> Result<Nonce> {
    if bytes.is_empty() {
        return Ok(Nonce::default());
    }
    Nonce::try_from_slice(bytes)
}

/// Object records of one bucket
pub struct Bucket {
    name: String,
    partition: fjall::PartitionHandle,
    engine: StorageEngine,
}

impl Bucket {
    /// Create or open bucket partition
    pub(crate) fn new(engine: StorageEngine, name: &str) -> Result<Self> {
        // fjall partition names are restricted, bucket names are not
        let partition = engine.partition(&format!("objects_{}", hex::encode(name)))?;

        Ok(Bucket {
            name: name.to_string(),
            partition,
            engine,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn put_pending(&self, record: &ObjectRecord) -> Result<()> {
        self.put(&pending_key(&record.encrypted_path, &record.stream_id), record)
    }

    pub fn get_pending(&self, encrypted_path: &str, stream_id: &StreamId) -> Result<Option<ObjectRecord>> {
        self.get(&pending_key(encrypted_path, stream_id))
    }

    pub fn remove_pending(&self, encrypted_path: &str, stream_id: &StreamId) -> Result<()> {
        self.remove(&pending_key(encrypted_path, stream_id))
    }

    pub fn put_committed(&self, record: &ObjectRecord) -> Result<()> {
        self.put(&committed_key(&record.encrypted_path), record)
    }

    pub fn get_committed(&self, encrypted_path: &str) -> Result<Option<ObjectRecord>> {
        self.get(&committed_key(encrypted_path))
    }

    pub fn remove_committed(&self, encrypted_path: &str) -> Result<()> {
        self.remove(&committed_key(encrypted_path))
    }

    /// All records with the given status whose path starts with `path_prefix`,
    /// in path order
    pub fn scan(&self, status: ObjectStatus, path_prefix: &str) -> Result<Vec<ObjectRecord>> {
        let mut scan_prefix = match status {
            ObjectStatus::Committed => COMMITTED_PREFIX.to_vec(),
            ObjectStatus::Uploading => PENDING_PREFIX.to_vec(),
        };
        scan_prefix.extend_from_slice(path_prefix.as_bytes());

        let mut records = Vec::new();
        for item in self.partition.prefix(&scan_prefix) {
            let (_key, value) = item.map_err(|e| StrandError::Storage(format!("Scan error: {}", e)))?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    /// Pending streams of exactly one path
    pub fn pending_streams(&self, encrypted_path: &str) -> Result<Vec<ObjectRecord>> {
        Ok(self
            .scan(ObjectStatus::Uploading, encrypted_path)?
            .into_iter()
            .filter(|r| r.encrypted_path == encrypted_path)
            .collect())
    }

    fn put(&self, key: &[u8], record: &ObjectRecord) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        self.partition
            .insert(key, value)
            .map_err(|e| StrandError::Storage(e.to_string()))?;
        self.engine.persist()
    }

    fn get(&self, key: &[u8]) -> Result<Option<ObjectRecord>> {
        match self.partition.get(key) {
            Ok(Some(data)) => Ok(Some(serde_json::from_slice(&data)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StrandError::Storage(e.to_string())),
        }
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.partition
            .remove(key)
            .map_err(|e| StrandError::Storage(e.to_string()))?;
        self.engine.persist()
    }
}

fn committed_key(encrypted_path: &str) -> Vec<u8> {
    let mut key = COMMITTED_PREFIX.to_vec();
    key.extend_from_slice(encrypted_path.as_bytes());
    key
}

fn pending_key(encrypted_path: &str, stream_id: &StreamId) -> Vec<u8> {
    let mut key = PENDING_PREFIX.to_vec();
    key.extend_from_slice(encrypted_path.as_bytes());
    key.push(0);
    key.extend_from_slice(stream_id.to_hex().as_bytes());
    key
}

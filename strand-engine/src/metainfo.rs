//! Embedded metainfo service
//!
//! Global partitions:
//!
//! ```text
//! buckets       {bucket}                               -> BucketRecord
//! streams       {stream hex}                           -> StreamRecord
//! segments      {stream hex}\0{part be32}{index be32}  -> SegmentRecord
//! segment_data  same key as `segments`                 -> raw bytes
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use strand_core::metainfo::*;
use strand_core::*;
use tracing::{debug, info};

use crate::{Bucket, ObjectRecord, StorageEngine};

/// Page size used when a listing does not ask for one
pub const DEFAULT_LIST_LIMIT: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BucketRecord {
    created: SystemTime,
}

/// Locates the object a stream belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamRecord {
    bucket: String,
    encrypted_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub part_number: i32,
    pub index: i32,
    pub plain_size: i64,
    pub created_at: SystemTime,
    pub etag: Vec<u8>,
}

/// [`MetainfoClient`] over a local [`StorageEngine`].
///
/// Every call runs fjall reads and `SyncAll` writes synchronously inside the
/// async method, blocking the runtime thread.
#[derive(Clone)]
pub struct LocalMetainfo {
    engine: StorageEngine,
    buckets: fjall::PartitionHandle,
    streams: fjall::PartitionHandle,
    segments: fjall::PartitionHandle,
    segment_data: fjall::PartitionHandle,
}

fn storage_err(e: fjall::Error) -> StrandError {
    StrandError::Storage(e.to_string())
}

fn bucket_not_found(bucket: &str) -> StrandError {
    RpcError::not_found(format!("bucket not found: {}", bucket)).into()
}

fn object_not_found(what: &str) -> StrandError {
    RpcError::not_found(format!("object not found: {}", what)).into()
}

fn segment_prefix(stream_id: &StreamId) -> Vec<u8> {
    let mut key = stream_id.to_hex().into_bytes();
    key.push(0);
    key
}

fn segment_key(stream_id: &StreamId, position: SegmentPosition) -> Vec<u8> {
    let mut key = segment_prefix(stream_id);
    key.extend_from_slice(&position.part_number.to_be_bytes());
    key.extend_from_slice(&position.index.to_be_bytes());
    key
}

impl LocalMetainfo {
    pub fn new(engine: StorageEngine) -> Result<Self> {
        Ok(LocalMetainfo {
            buckets: engine.partition("buckets")?,
            streams: engine.partition("streams")?,
            segments: engine.partition("segments")?,
            segment_data: engine.partition("segment_data")?,
            engine,
        })
    }

    /// Create a bucket; creating an existing bucket is a no-op
    pub fn create_bucket(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(StrandError::NoBucket);
        }

        let _guard = self.engine.write_lock();
        if self.bucket_exists(name)? {
            return Ok(());
        }

        let record = serde_json::to_vec(&BucketRecord { created: SystemTime::now() })?;
        self.buckets.insert(name.as_bytes(), record).map_err(storage_err)?;
        self.engine.persist()?;

        info!("Bucket created: bucket={}", name);
        Ok(())
    }

    pub fn bucket_exists(&self, name: &str) -> Result<bool> {
        self.buckets.contains_key(name.as_bytes()).map_err(storage_err)
    }

    fn open_bucket(&self, name: &str) -> Result<Bucket> {
        if !self.bucket_exists(name)? {
            return Err(bucket_not_found(name));
        }
        self.engine.bucket(name)
    }

    fn stream(&self, stream_id: &StreamId) -> Result<Option<StreamRecord>> {
        match self.streams.get(stream_id.to_hex().as_bytes()).map_err(storage_err)? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Pending object a stream belongs to, if the stream is still uploading
    pub fn pending_object(&self, stream_id: &StreamId) -> Result<Option<(Bucket, ObjectRecord)>> {
        let Some(stream) = self.stream(stream_id)? else {
            return Ok(None);
        };
        let bucket = self.open_bucket(&stream.bucket)?;
        Ok(bucket
            .get_pending(&stream.encrypted_path, stream_id)?
            .map(|record| (bucket, record)))
    }

    /// Store one segment of a pending stream
    pub fn put_segment(
        &self,
        stream_id: &StreamId,
        position: SegmentPosition,
        data: &[u8],
        etag: Vec<u8>,
    ) -> Result<SegmentRecord> {
        let _guard = self.engine.write_lock();
        if self.pending_object(stream_id)?.is_none() {
            return Err(object_not_found(&stream_id.to_hex()));
        }

        let record = SegmentRecord {
            part_number: position.part_number,
            index: position.index,
            plain_size: data.len() as i64,
            created_at: SystemTime::now(),
            etag,
        };
        let key = segment_key(stream_id, position);
        self.segment_data.insert(key.as_slice(), data).map_err(storage_err)?;
        self.segments
            .insert(key.as_slice(), serde_json::to_vec(&record)?)
            .map_err(storage_err)?;
        self.engine.persist()?;

        debug!(
            "Segment stored: stream={}, part={}, index={}, size={}",
            stream_id,
            position.part_number,
            position.index,
            data.len()
        );
        Ok(record)
    }

    /// Raw bytes of one segment
    pub fn segment_data(&self, stream_id: &StreamId, position: SegmentPosition) -> Result<Option<Vec<u8>>> {
        Ok(self
            .segment_data
            .get(segment_key(stream_id, position))
            .map_err(storage_err)?
            .map(|data| data.to_vec()))
    }

    fn segment_records(&self, stream_id: &StreamId) -> Result<Vec<SegmentRecord>> {
        let mut records = Vec::new();
        for item in self.segments.prefix(segment_prefix(stream_id)) {
            let (_key, value) = item.map_err(storage_err)?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    fn delete_stream(&self, stream_id: &StreamId) -> Result<()> {
        let mut keys = Vec::new();
        for item in self.segments.prefix(segment_prefix(stream_id)) {
            let (key, _value) = item.map_err(storage_err)?;
            keys.push(key.to_vec());
        }
        for key in &keys {
            self.segments.remove(key.as_slice()).map_err(storage_err)?;
            self.segment_data.remove(key.as_slice()).map_err(storage_err)?;
        }
        self.streams
            .remove(stream_id.to_hex().as_bytes())
            .map_err(storage_err)?;
        self.engine.persist()?;

        debug!("Stream deleted: stream={}, segments={}", stream_id, keys.len());
        Ok(())
    }

    fn begin(&self, params: BeginObjectParams) -> Result<BeginObjectResponse> {
        if params.bucket.is_empty() {
            return Err(StrandError::NoBucket);
        }
        if params.encrypted_path.is_empty() {
            return Err(StrandError::NoPath);
        }

        let _guard = self.engine.write_lock();
        let bucket = self.open_bucket(&params.bucket)?;

        let stream_id = StreamId::from_bytes(&ulid::Ulid::new().to_bytes())?;
        let stream = StreamRecord {
            bucket: params.bucket.clone(),
            encrypted_path: params.encrypted_path.clone(),
        };
        self.streams
            .insert(stream_id.to_hex().as_bytes(), serde_json::to_vec(&stream)?)
            .map_err(storage_err)?;

        bucket.put_pending(&ObjectRecord {
            encrypted_path: params.encrypted_path,
            stream_id: stream_id.clone(),
            status: ObjectStatus::Uploading,
            created: SystemTime::now(),
            expires: params.expires_at,
            plain_size: 0,
            encrypted_metadata_nonce: Vec::new(),
            encrypted_metadata_encrypted_key: Vec::new(),
            encrypted_metadata: Vec::new(),
            encryption_parameters: params.encryption_parameters,
        })?;

        debug!("Object stream started: bucket={}, stream={}", params.bucket, stream_id);
        Ok(BeginObjectResponse { stream_id })
    }

    fn commit(&self, params: CommitObjectParams) -> Result<()> {
        let _guard = self.engine.write_lock();
        let Some((bucket, pending)) = self.pending_object(&params.stream_id)? else {
            return Err(object_not_found(&params.stream_id.to_hex()));
        };

        let plain_size = self
            .segment_records(&params.stream_id)?
            .iter()
            .map(|s| s.plain_size)
            .sum();

        if let Some(previous) = bucket.get_committed(&pending.encrypted_path)? {
            if previous.stream_id != pending.stream_id {
                self.delete_stream(&previous.stream_id)?;
            }
        }

        let committed = ObjectRecord {
            status: ObjectStatus::Committed,
            plain_size,
            encrypted_metadata_nonce: params.encrypted_metadata_nonce.as_bytes().to_vec(),
            encrypted_metadata_encrypted_key: params.encrypted_metadata_encrypted_key,
            encrypted_metadata: params.encrypted_metadata,
            ..pending
        };
        bucket.put_committed(&committed)?;
        bucket.remove_pending(&committed.encrypted_path, &committed.stream_id)?;

        info!(
            "Object committed: bucket={}, stream={}, size={}",
            bucket.name(),
            committed.stream_id,
            plain_size
        );
        Ok(())
    }

    fn begin_delete(&self, params: BeginDeleteObjectParams) -> Result<Option<RawObjectItem>> {
        let _guard = self.engine.write_lock();
        let bucket = self.open_bucket(&params.bucket)?;

        let record = match (params.status, &params.stream_id) {
            (ObjectStatus::Uploading, Some(stream_id)) => {
                bucket.get_pending(&params.encrypted_path, stream_id)?
            }
            (ObjectStatus::Uploading, None) => bucket.pending_streams(&params.encrypted_path)?.into_iter().next(),
            (ObjectStatus::Committed, _) => bucket.get_committed(&params.encrypted_path)?,
        };
        let Some(record) = record else {
            return Err(object_not_found(&params.encrypted_path));
        };

        match record.status {
            ObjectStatus::Uploading => bucket.remove_pending(&record.encrypted_path, &record.stream_id)?,
            ObjectStatus::Committed => bucket.remove_committed(&record.encrypted_path)?,
        }
        self.delete_stream(&record.stream_id)?;

        info!("Object deleted: bucket={}, stream={}", params.bucket, record.stream_id);
        Ok(Some(record.into_raw(&params.bucket)?))
    }

    fn get(&self, bucket: &str, encrypted_path: &str) -> Result<RawObjectItem> {
        match self.open_bucket(bucket)?.get_committed(encrypted_path)? {
            Some(record) => record.into_raw(bucket),
            None => Err(object_not_found(encrypted_path)),
        }
    }

    fn list(&self, params: ListObjectsParams) -> Result<ObjectList> {
        let options = &params.options;
        let bucket = self.open_bucket(&params.bucket)?;
        let status = options.status.unwrap_or(ObjectStatus::Committed);
        let include_metadata = options.include_custom_metadata || options.include_system_metadata;

        let mut items: Vec<ObjectListItem> = Vec::new();
        for record in bucket.scan(status, &options.prefix)? {
            let mut item = record.to_list_item(&options.prefix, include_metadata)?;

            if !options.recursive {
                if let Some(slash) = item.encrypted_path.find('/') {
                    let collapsed = item.encrypted_path[..=slash].to_string();
                    if items.last().is_some_and(|last| last.is_prefix && last.encrypted_path == collapsed) {
                        continue;
                    }
                    item = ObjectListItem {
                        encrypted_path: collapsed,
                        stream_id: None,
                        is_prefix: true,
                        created: None,
                        expires: None,
                        plain_size: 0,
                        encrypted_metadata_nonce: Default::default(),
                        encrypted_metadata_encrypted_key: Vec::new(),
                        encrypted_metadata: Vec::new(),
                        ..item
                    };
                }
            }
            items.push(item);
        }

        let items = items
            .into_iter()
            .filter(|item| past_cursor(&item.encrypted_path, &options.cursor, options.direction))
            .collect();
        Ok(paginate(items, options.limit))
    }

    fn list_pending(&self, params: ListPendingObjectStreamsParams) -> Result<ObjectList> {
        let options = &params.options;
        let bucket = self.open_bucket(&params.bucket)?;

        let mut items = Vec::new();
        for record in bucket.pending_streams(&params.encrypted_path)? {
            if !past_cursor(&record.stream_id.to_hex(), &options.cursor, options.direction) {
                continue;
            }
            // full path, pending streams are listed per object
            items.push(record.to_list_item("", true)?);
        }
        Ok(paginate(items, options.limit))
    }

    fn segments(&self, params: ListSegmentsParams) -> Result<SegmentList> {
        if self.stream(&params.stream_id)?.is_none() {
            return Err(object_not_found(&params.stream_id.to_hex()));
        }

        let limit = if params.limit == 0 { DEFAULT_LIST_LIMIT } else { params.limit };
        let mut items = Vec::new();
        let mut more = false;
        for record in self.segment_records(&params.stream_id)? {
            let position = SegmentPosition {
                part_number: record.part_number,
                index: record.index,
            };
            // zero cursor lists from the start
            if params.cursor != SegmentPosition::default() && position <= params.cursor {
                continue;
            }
            if items.len() == limit {
                more = true;
                break;
            }
            items.push(SegmentListItem {
                position,
                plain_size: record.plain_size,
                created_at: record.created_at,
                etag: record.etag,
            });
        }
        Ok(SegmentList { items, more })
    }
}

fn past_cursor(value: &str, cursor: &str, direction: ListDirection) -> bool {
    if cursor.is_empty() {
        return true;
    }
    match direction {
        ListDirection::Forward => value >= cursor,
        ListDirection::After => value > cursor,
    }
}

fn paginate(mut items: Vec<ObjectListItem>, limit: usize) -> ObjectList {
    let limit = if limit == 0 { DEFAULT_LIST_LIMIT } else { limit };
    let more = items.len() > limit;
    items.truncate(limit);
    ObjectList { items, more }
}

#[async_trait]
impl MetainfoClient for LocalMetainfo {
    async fn begin_object(&self, params: BeginObjectParams) -> Result<BeginObjectResponse> {
        self.begin(params)
    }

    async fn commit_object(&self, params: CommitObjectParams) -> Result<()> {
        self.commit(params)
    }

    async fn begin_delete_object(&self, params: BeginDeleteObjectParams) -> Result<Option<RawObjectItem>> {
        self.begin_delete(params)
    }

    async fn get_object(&self, bucket: &str, encrypted_path: &str) -> Result<RawObjectItem> {
        self.get(bucket, encrypted_path)
    }

    async fn list_objects(&self, params: ListObjectsParams) -> Result<ObjectList> {
        self.list(params)
    }

    async fn list_pending_object_streams(&self, params: ListPendingObjectStreamsParams) -> Result<ObjectList> {
        self.list_pending(params)
    }

    async fn list_segments(&self, params: ListSegmentsParams) -> Result<SegmentList> {
        self.segments(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::encryption::EncryptionParameters;

    fn setup() -> (LocalMetainfo, tempfile::TempDir) {
        let (engine, temp) = StorageEngine::temp().unwrap();
        let metainfo = LocalMetainfo::new(engine).unwrap();
        metainfo.create_bucket("bucket").unwrap();
        (metainfo, temp)
    }

    fn begin(metainfo: &LocalMetainfo, path: &str) -> StreamId {
        metainfo
            .begin(BeginObjectParams {
                bucket: "bucket".to_string(),
                encrypted_path: path.to_string(),
                expires_at: None,
                encryption_parameters: EncryptionParameters::default(),
            })
            .unwrap()
            .stream_id
    }

    #[test]
    fn test_begin_requires_existing_bucket() {
        let (metainfo, _temp) = setup();
        let err = metainfo
            .begin(BeginObjectParams {
                bucket: "missing".to_string(),
                encrypted_path: "p".to_string(),
                expires_at: None,
                encryption_parameters: EncryptionParameters::default(),
            })
            .unwrap_err();

        assert_eq!(err.rpc_code(), Some(StatusCode::NotFound));
        assert_eq!(err.to_string(), "rpc error: bucket not found: missing");
    }

    #[test]
    fn test_segments_are_ordered_by_position() {
        let (metainfo, _temp) = setup();
        let stream = begin(&metainfo, "p");

        for part in [3, 1, 2] {
            let position = SegmentPosition { part_number: part, index: 0 };
            metainfo.put_segment(&stream, position, &[0u8; 10], vec![part as u8]).unwrap();
        }

        let list = metainfo
            .segments(ListSegmentsParams {
                stream_id: stream.clone(),
                cursor: SegmentPosition { part_number: 1, index: 0 },
                limit: 1,
            })
            .unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].position.part_number, 2);
        assert!(list.more);
    }

    #[test]
    fn test_commit_replaces_previous_object() {
        let (metainfo, _temp) = setup();
        let first = begin(&metainfo, "p");
        metainfo
            .put_segment(&first, SegmentPosition::default(), b"old", Vec::new())
            .unwrap();
        metainfo.commit(CommitObjectParams {
            stream_id: first.clone(),
            encrypted_metadata: Vec::new(),
            encrypted_metadata_encrypted_key: Vec::new(),
            encrypted_metadata_nonce: Default::default(),
        })
        .unwrap();

        let second = begin(&metainfo, "p");
        metainfo.commit(CommitObjectParams {
            stream_id: second.clone(),
            encrypted_metadata: Vec::new(),
            encrypted_metadata_encrypted_key: Vec::new(),
            encrypted_metadata_nonce: Default::default(),
        })
        .unwrap();

        assert_eq!(metainfo.get("bucket", "p").unwrap().stream_id, second);
        assert!(metainfo.segment_data(&first, SegmentPosition::default()).unwrap().is_none());
    }

    #[test]
    fn test_non_recursive_listing_collapses_prefixes() {
        let (metainfo, _temp) = setup();
        for path in ["a/1", "a/2", "b", "c/x/y"] {
            begin(&metainfo, path);
        }

        let list = metainfo
            .list(ListObjectsParams {
                bucket: "bucket".to_string(),
                options: ListOptions {
                    status: Some(ObjectStatus::Uploading),
                    ..Default::default()
                },
            })
            .unwrap();
        let paths: Vec<_> = list.items.iter().map(|i| (i.encrypted_path.as_str(), i.is_prefix)).collect();
        assert_eq!(paths, vec![("a/", true), ("b", false), ("c/", true)]);
    }
}

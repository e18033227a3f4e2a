//! Metainfo service interface
//!
//! The coordinator talks to the remote control plane only through
//! [`MetainfoClient`]. Paths crossing this boundary are always encrypted.

use crate::encryption::{EncryptionParameters, Nonce};
use crate::{Result, StreamId};
use async_trait::async_trait;
use std::time::SystemTime;

/// Lifecycle status of a remote object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(i32)]
pub enum ObjectStatus {
    Uploading = 1,
    Committed = 3,
}

/// Listing direction relative to the cursor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListDirection {
    /// Forwards from the cursor, including it
    #[default]
    Forward,
    /// Forwards from the cursor, excluding it
    After,
}

#[derive(Debug, Clone)]
pub struct BeginObjectParams {
    pub bucket: String,
    pub encrypted_path: String,
    pub expires_at: Option<SystemTime>,
    pub encryption_parameters: EncryptionParameters,
}

#[derive(Debug, Clone)]
pub struct BeginObjectResponse {
    pub stream_id: StreamId,
}

#[derive(Debug, Clone)]
pub struct CommitObjectParams {
    pub stream_id: StreamId,
    pub encrypted_metadata: Vec<u8>,
    pub encrypted_metadata_encrypted_key: Vec<u8>,
    pub encrypted_metadata_nonce: Nonce,
}

#[derive(Debug, Clone)]
pub struct BeginDeleteObjectParams {
    pub bucket: String,
    pub encrypted_path: String,
    pub stream_id: Option<StreamId>,
    pub status: ObjectStatus,
}

/// Raw object as stored remotely
#[derive(Debug, Clone)]
pub struct RawObjectItem {
    pub bucket: String,
    pub encrypted_path: String,
    pub stream_id: StreamId,
    pub status: ObjectStatus,
    pub created: SystemTime,
    pub expires: Option<SystemTime>,
    pub plain_size: i64,
    pub encrypted_metadata_nonce: Nonce,
    pub encrypted_metadata_encrypted_key: Vec<u8>,
    pub encrypted_metadata: Vec<u8>,
    pub encryption_parameters: EncryptionParameters,
}

/// Options for object listing; `prefix` and `cursor` are encrypted
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub prefix: String,
    /// Relative to `prefix`
    pub cursor: String,
    pub recursive: bool,
    pub direction: ListDirection,
    pub limit: usize,
    pub include_custom_metadata: bool,
    pub include_system_metadata: bool,
    pub status: Option<ObjectStatus>,
}

impl ListOptions {
    /// Options for the page after `list`, or `None` when exhausted
    pub fn next_page(&self, list: &ObjectList) -> Option<ListOptions> {
        if !list.more {
            return None;
        }
        let last = list.items.last()?;

        Some(ListOptions {
            cursor: last.encrypted_path.clone(),
            direction: ListDirection::After,
            ..self.clone()
        })
    }
}

/// One listed object; `encrypted_path` is relative to the listing prefix
#[derive(Debug, Clone)]
pub struct ObjectListItem {
    pub encrypted_path: String,
    pub stream_id: Option<StreamId>,
    pub status: ObjectStatus,
    pub is_prefix: bool,
    pub created: Option<SystemTime>,
    pub expires: Option<SystemTime>,
    pub plain_size: i64,
    pub encrypted_metadata_nonce: Nonce,
    pub encrypted_metadata_encrypted_key: Vec<u8>,
    pub encrypted_metadata: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectList {
    pub items: Vec<ObjectListItem>,
    pub more: bool,
}

#[derive(Debug, Clone)]
pub struct ListObjectsParams {
    pub bucket: String,
    pub options: ListOptions,
}

#[derive(Debug, Clone)]
pub struct ListPendingObjectStreamsParams {
    pub bucket: String,
    /// Full encrypted path of the object
    pub encrypted_path: String,
    pub options: ListOptions,
}

/// Position of a segment inside an object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentPosition {
    pub part_number: i32,
    pub index: i32,
}

#[derive(Debug, Clone)]
pub struct ListSegmentsParams {
    pub stream_id: StreamId,
    /// Exclusive: only segments after this position are returned. The zero
    /// position lists from the start.
    pub cursor: SegmentPosition,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct SegmentListItem {
    pub position: SegmentPosition,
    pub plain_size: i64,
    pub created_at: SystemTime,
    pub etag: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct SegmentList {
    pub items: Vec<SegmentListItem>,
    pub more: bool,
}

/// Remote control plane for objects and streams
#[async_trait]
pub trait MetainfoClient: Send + Sync {
    async fn begin_object(&self, params: BeginObjectParams) -> Result<BeginObjectResponse>;

    async fn commit_object(&self, params: CommitObjectParams) -> Result<()>;

    /// Starts deleting an object; returns the removed object when known
    async fn begin_delete_object(&self, params: BeginDeleteObjectParams) -> Result<Option<RawObjectItem>>;

    async fn get_object(&self, bucket: &str, encrypted_path: &str) -> Result<RawObjectItem>;

    async fn list_objects(&self, params: ListObjectsParams) -> Result<ObjectList>;

    async fn list_pending_object_streams(&self, params: ListPendingObjectStreamsParams) -> Result<ObjectList>;

    async fn list_segments(&self, params: ListSegmentsParams) -> Result<SegmentList>;
}

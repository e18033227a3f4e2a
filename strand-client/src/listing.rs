//! Listing iterators for uploads and their parts
//!
//! Both iterators fetch pages lazily. Validation failures are reported
//! through `err()` before any remote call is made.

use futures::stream::{self, Stream};
use std::collections::VecDeque;
use strand_core::metadata::open_metadata;
use strand_core::metainfo::{
    ListDirection, ListObjectsParams, ListOptions, ListPendingObjectStreamsParams, ListSegmentsParams, ObjectList,
    ObjectListItem, ObjectStatus, SegmentPosition,
};
use strand_core::*;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::convert_known_errors;
use crate::project::{decode_upload_id, race, validate};
use crate::{ClientError, Project, Result};

#[derive(Debug, Clone, Default)]
pub struct ListUploadsOptions {
    /// Only uploads whose key starts with this prefix. A prefix without a
    /// trailing `/` selects the uploads of exactly that key.
    pub prefix: String,
    /// Start after this key. For an exact-key listing, the upload ID to
    /// start after.
    pub cursor: String,
    pub recursive: bool,
    /// Include system metadata
    pub system: bool,
    /// Include custom metadata
    pub custom: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListUploadPartsOptions {
    /// List parts after this part number
    pub cursor: u32,
}

enum Source {
    Objects,
    /// Pending streams of one object
    Streams { encrypted_path: String },
}

/// Iterator over pending uploads
pub struct UploadIterator {
    project: Project,
    cancel: CancellationToken,
    bucket: String,
    prefix: String,
    source: Source,
    request: Option<ListOptions>,
    options: ListUploadsOptions,
    page: VecDeque<ObjectListItem>,
    item: Option<UploadInfo>,
    err: Option<ClientError>,
    done: bool,
}

impl UploadIterator {
    pub(crate) fn new(project: Project, cancel: CancellationToken, bucket: &str, options: &ListUploadsOptions) -> Self {
        let mut iter = UploadIterator {
            project,
            cancel,
            bucket: bucket.to_string(),
            prefix: options.prefix.clone(),
            source: Source::Objects,
            request: None,
            options: options.clone(),
            page: VecDeque::new(),
            item: None,
            err: None,
            done: false,
        };

        if let Err(err) = iter.prepare() {
            iter.fail(err);
        }
        iter
    }

    fn prepare(&mut self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(ClientError::BucketNameInvalid(self.bucket.clone()));
        }
        let keys = self.project.keys();
        let prefix = self.prefix.as_str();
        let convert = |e| convert_known_errors(e, &self.bucket, prefix);

        let mut request = ListOptions {
            recursive: self.options.recursive,
            direction: ListDirection::After,
            include_custom_metadata: self.options.custom,
            include_system_metadata: self.options.system,
            status: Some(ObjectStatus::Uploading),
            ..Default::default()
        };

        if !prefix.is_empty() && !prefix.ends_with('/') {
            let encrypted_path = keys.encrypt_path(&self.bucket, prefix).map_err(convert)?;
            if !self.options.cursor.is_empty() {
                request.cursor = decode_upload_id(&self.options.cursor)?.to_hex();
            }
            self.source = Source::Streams { encrypted_path };
        } else {
            let encrypted_prefix = if prefix.is_empty() {
                String::new()
            } else {
                keys.encrypt_path(&self.bucket, prefix).map_err(convert)?
            };

            // encrypted paths of children extend the encrypted parent path
            let cursor = self.options.cursor.strip_prefix(prefix).unwrap_or(&self.options.cursor);
            if !cursor.is_empty() {
                let full = keys.encrypt_path(&self.bucket, &format!("{}{}", prefix, cursor)).map_err(convert)?;
                request.cursor = full.strip_prefix(&encrypted_prefix).unwrap_or(&full).to_string();
            }
            request.prefix = encrypted_prefix;
        }

        self.request = Some(request);
        Ok(())
    }

    /// Advance to the next upload
    pub async fn next(&mut self) -> Option<UploadInfo> {
        loop {
            if self.done {
                return None;
            }
            if let Some(raw) = self.page.pop_front() {
                match self.convert(raw) {
                    Ok(info) => {
                        self.item = Some(info.clone());
                        return Some(info);
                    }
                    Err(err) => {
                        self.fail(err);
                        return None;
                    }
                }
            }
            let Some(request) = self.request.take() else {
                self.done = true;
                return None;
            };
            if let Err(err) = self.fetch(request).await {
                self.fail(err);
                return None;
            }
        }
    }

    /// The upload returned by the last successful `next`
    pub fn item(&self) -> Option<&UploadInfo> {
        self.item.as_ref()
    }

    /// The error that ended the iteration, if any
    pub fn err(&self) -> Option<&ClientError> {
        self.err.as_ref()
    }

    /// Consume the iterator as a stream; an error is yielded once, last
    pub fn into_stream(self) -> impl Stream<Item = Result<UploadInfo>> {
        stream::unfold(self, |mut iter| async move {
            match iter.next().await {
                Some(info) => Some((Ok(info), iter)),
                None => iter.err.take().map(|err| (Err(err), iter)),
            }
        })
    }

    fn fail(&mut self, err: ClientError) {
        self.err = Some(err);
        self.done = true;
    }

    async fn fetch(&mut self, request: ListOptions) -> Result<()> {
        let metainfo = self.project.metainfo();
        let list = match &self.source {
            Source::Objects => {
                race(
                    &self.cancel,
                    metainfo.list_objects(ListObjectsParams {
                        bucket: self.bucket.clone(),
                        options: request.clone(),
                    }),
                )
                .await
            }
            Source::Streams { encrypted_path } => {
                race(
                    &self.cancel,
                    metainfo.list_pending_object_streams(ListPendingObjectStreamsParams {
                        bucket: self.bucket.clone(),
                        encrypted_path: encrypted_path.clone(),
                        options: request.clone(),
                    }),
                )
                .await
            }
        }
        .map_err(|e| convert_known_errors(e, &self.bucket, &self.prefix))?;

        debug!("Listed uploads: bucket={}, items={}, more={}", self.bucket, list.items.len(), list.more);
        self.request = self.next_request(&request, &list);
        self.page = list.items.into();
        Ok(())
    }

    fn next_request(&self, request: &ListOptions, list: &ObjectList) -> Option<ListOptions> {
        match self.source {
            Source::Objects => request.next_page(list),
            Source::Streams { .. } => {
                if !list.more {
                    return None;
                }
                let last = list.items.last()?.stream_id.as_ref()?;
                Some(ListOptions {
                    cursor: last.to_hex(),
                    direction: ListDirection::After,
                    ..request.clone()
                })
            }
        }
    }

    fn convert(&self, raw: ObjectListItem) -> Result<UploadInfo> {
        let keys = self.project.keys();
        let key = match self.source {
            Source::Objects => {
                let relative = keys.decrypt_path_under(&self.bucket, &self.prefix, &raw.encrypted_path);
                relative.map(|r| format!("{}{}", self.prefix, r))
            }
            Source::Streams { .. } => keys.decrypt_path(&self.bucket, &raw.encrypted_path),
        }
        .map_err(|e| convert_known_errors(e, &self.bucket, &self.prefix))?;

        let upload_id = raw
            .stream_id
            .as_ref()
            .map(|id| upload_id::encode(id.as_bytes()))
            .unwrap_or_default();

        let system = if self.options.system && !raw.is_prefix {
            SystemMetadata {
                created: raw.created,
                expires: raw.expires,
                content_length: raw.plain_size,
            }
        } else {
            SystemMetadata::default()
        };

        let custom = if self.options.custom && !raw.is_prefix {
            open_metadata(
                keys,
                self.project.encryption_parameters(),
                &self.bucket,
                &key,
                &raw.encrypted_metadata,
                &raw.encrypted_metadata_encrypted_key,
                &raw.encrypted_metadata_nonce,
            )
            .map_err(|e| convert_known_errors(e, &self.bucket, &key))?
        } else {
            CustomMetadata::default()
        };

        Ok(UploadInfo {
            upload_id,
            key,
            is_prefix: raw.is_prefix,
            system,
            custom,
        })
    }
}

/// Iterator over the parts of one upload
pub struct PartIterator {
    project: Project,
    cancel: CancellationToken,
    bucket: String,
    key: String,
    stream_id: Option<StreamId>,
    cursor: SegmentPosition,
    more: bool,
    /// Last part of the previous page; may continue on the next one
    partial: Option<Part>,
    page: VecDeque<Part>,
    item: Option<Part>,
    err: Option<ClientError>,
    done: bool,
}

impl PartIterator {
    pub(crate) fn new(
        project: Project,
        cancel: CancellationToken,
        bucket: &str,
        key: &str,
        upload_id: &str,
        options: &ListUploadPartsOptions,
    ) -> Self {
        // a nonzero cursor skips every segment of that part
        let cursor = if options.cursor == 0 {
            SegmentPosition::default()
        } else {
            SegmentPosition {
                part_number: options.cursor.min(i32::MAX as u32) as i32,
                index: i32::MAX,
            }
        };

        let mut iter = PartIterator {
            project,
            cancel,
            bucket: bucket.to_string(),
            key: key.to_string(),
            stream_id: None,
            cursor,
            more: true,
            partial: None,
            page: VecDeque::new(),
            item: None,
            err: None,
            done: false,
        };

        let stream_id = validate(bucket, key).and_then(|_| {
            if upload_id.is_empty() {
                return Err(ClientError::UploadIdInvalid);
            }
            decode_upload_id(upload_id)
        });
        match stream_id {
            Ok(id) => iter.stream_id = Some(id),
            Err(err) => {
                iter.err = Some(err);
                iter.done = true;
            }
        }
        iter
    }

    /// Advance to the next part
    pub async fn next(&mut self) -> Option<Part> {
        loop {
            if self.done {
                return None;
            }
            if let Some(part) = self.page.pop_front() {
                self.item = Some(part.clone());
                return Some(part);
            }
            if !self.more {
                match self.partial.take() {
                    Some(part) => self.page.push_back(part),
                    None => self.done = true,
                }
                continue;
            }
            if let Err(err) = self.fetch().await {
                self.err = Some(err);
                self.done = true;
                return None;
            }
        }
    }

    /// The part returned by the last successful `next`
    pub fn item(&self) -> Option<&Part> {
        self.item.as_ref()
    }

    /// The error that ended the iteration, if any
    pub fn err(&self) -> Option<&ClientError> {
        self.err.as_ref()
    }

    /// Consume the iterator as a stream; an error is yielded once, last
    pub fn into_stream(self) -> impl Stream<Item = Result<Part>> {
        stream::unfold(self, |mut iter| async move {
            match iter.next().await {
                Some(part) => Some((Ok(part), iter)),
                None => iter.err.take().map(|err| (Err(err), iter)),
            }
        })
    }

    async fn fetch(&mut self) -> Result<()> {
        let Some(stream_id) = self.stream_id.clone() else {
            self.more = false;
            return Ok(());
        };

        let list = race(
            &self.cancel,
            self.project.metainfo().list_segments(ListSegmentsParams {
                stream_id,
                cursor: self.cursor,
                limit: 0,
            }),
        )
        .await
        .map_err(|e| convert_known_errors(e, &self.bucket, &self.key))?;

        debug!("Listed segments: bucket={}, key={}, items={}, more={}", self.bucket, self.key, list.items.len(), list.more);
        self.more = list.more && !list.items.is_empty();

        for segment in list.items {
            self.cursor = segment.position;
            let number = segment.position.part_number as u32;

            match self.partial.as_mut() {
                Some(part) if part.part_number == number => {
                    part.size += segment.plain_size;
                    if part.modified.map_or(true, |m| segment.created_at > m) {
                        part.modified = Some(segment.created_at);
                    }
                    if !segment.etag.is_empty() {
                        part.etag = segment.etag;
                    }
                    continue;
                }
                _ => {}
            }

            if let Some(finished) = self.partial.take() {
                self.page.push_back(finished);
            }
            self.partial = Some(Part {
                part_number: number,
                size: segment.plain_size,
                modified: Some(segment.created_at),
                etag: segment.etag,
            });
        }
        Ok(())
    }
}

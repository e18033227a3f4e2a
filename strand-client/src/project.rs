//! Upload coordinator

use rand::rngs::OsRng;
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;
use strand_core::encryption::{EncryptionParameters, KeyStore};
use strand_core::metadata::{open_metadata, prepare_commit_payload};
use strand_core::metainfo::{BeginDeleteObjectParams, BeginObjectParams, CommitObjectParams, MetainfoClient, ObjectStatus};
use strand_core::stream::{OpenPartParams, TransferEngine};
use strand_core::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::convert_known_errors;
use crate::listing::{ListUploadPartsOptions, ListUploadsOptions, PartIterator, UploadIterator};
use crate::multipart::{ETagCell, PartUpload};
use crate::{ClientError, Result};

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub expires: Option<SystemTime>,
}

#[derive(Debug, Clone, Default)]
pub struct CommitUploadOptions {
    pub custom_metadata: CustomMetadata,
}

/// Entry point for multipart uploads into one project.
///
/// Cheap to clone. Every operation takes the caller's cancellation token;
/// remote calls fail with a cancellation error once it fires.
#[derive(Clone)]
pub struct Project {
    metainfo: Arc<dyn MetainfoClient>,
    transfer: Arc<dyn TransferEngine>,
    keys: Arc<KeyStore>,
    params: EncryptionParameters,
}

impl Project {
    pub fn new(
        metainfo: Arc<dyn MetainfoClient>,
        transfer: Arc<dyn TransferEngine>,
        keys: KeyStore,
        params: EncryptionParameters,
    ) -> Self {
        Project {
            metainfo,
            transfer,
            keys: Arc::new(keys),
            params,
        }
    }

    /// Build a project from configuration
    pub fn from_config(
        config: &ProjectConfig,
        metainfo: Arc<dyn MetainfoClient>,
        transfer: Arc<dyn TransferEngine>,
    ) -> Result<Self> {
        let keys = config.key_store().map_err(ClientError::Wrapped)?;
        Ok(Self::new(metainfo, transfer, keys, config.encryption_parameters()))
    }

    pub(crate) fn metainfo(&self) -> &dyn MetainfoClient {
        self.metainfo.as_ref()
    }

    pub(crate) fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub(crate) fn encryption_parameters(&self) -> &EncryptionParameters {
        &self.params
    }

    /// Start a multipart upload to `bucket`/`key`
    pub async fn begin_upload(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        key: &str,
        options: &UploadOptions,
    ) -> Result<UploadInfo> {
        debug!("Beginning upload: bucket={}, key={}", bucket, key);
        validate(bucket, key)?;

        let encrypted_path = self
            .keys
            .encrypt_path(bucket, key)
            .map_err(|e| convert_known_errors(e, bucket, key))?;

        let response = race(
            cancel,
            self.metainfo.begin_object(BeginObjectParams {
                bucket: bucket.to_string(),
                encrypted_path,
                expires_at: options.expires,
                encryption_parameters: self.params,
            }),
        )
        .await
        .map_err(|e| convert_known_errors(e, bucket, key))?;

        let upload_id = upload_id::encode(response.stream_id.as_bytes());
        info!("Upload started: bucket={}, key={}, stream={}", bucket, key, response.stream_id);

        Ok(UploadInfo {
            upload_id,
            key: key.to_string(),
            is_prefix: false,
            system: SystemMetadata {
                expires: options.expires,
                ..Default::default()
            },
            custom: CustomMetadata::default(),
        })
    }

    /// Commit the upload `upload_id` started with [`Project::begin_upload`]
    pub async fn commit_upload(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        key: &str,
        upload_id: &str,
        options: &CommitUploadOptions,
    ) -> Result<Object> {
        debug!("Committing upload: bucket={}, key={}", bucket, key);
        let stream_id = validate_upload(bucket, key, upload_id)?;

        // fresh metadata key and nonce on every attempt
        let payload = prepare_commit_payload(
            &self.keys,
            &self.params,
            bucket,
            key,
            &options.custom_metadata,
            &mut OsRng,
        )
        .map_err(|e| convert_known_errors(e, bucket, key))?;

        let committed = race(
            cancel,
            self.metainfo.commit_object(CommitObjectParams {
                stream_id,
                encrypted_metadata: payload.encrypted_metadata,
                encrypted_metadata_encrypted_key: payload.encrypted_key,
                encrypted_metadata_nonce: payload.key_nonce,
            }),
        )
        .await;

        if let Err(e) = committed {
            let err = convert_known_errors(e, bucket, key);
            warn!("Commit failed: bucket={}, key={}: {}", bucket, key, err);
            return Err(err);
        }

        info!("Upload committed: bucket={}, key={}", bucket, key);
        Ok(Object::with_key(key))
    }

    /// Open part `part_number` of an upload for writing
    pub async fn upload_part(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
    ) -> Result<PartUpload> {
        debug!("Uploading part: bucket={}, key={}, part={}", bucket, key, part_number);
        validate(bucket, key)?;
        if upload_id.is_empty() {
            return Err(ClientError::UploadIdInvalid);
        }
        if part_number >= i32::MAX as u32 {
            return Err(ClientError::PartNumberOutOfRange(part_number));
        }
        let stream_id = decode_upload_id(upload_id)?;

        // aborting the part cancels only its own scope
        let scope = cancel.child_token();
        let etag = Arc::new(ETagCell::default());

        let sink = race(
            cancel,
            self.transfer.open_part(
                OpenPartParams {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    stream_id,
                    part_number,
                },
                etag.clone(),
                scope.clone(),
            ),
        )
        .await
        .map_err(|e| convert_known_errors(e, bucket, key))?;

        Ok(PartUpload::new(
            bucket.to_string(),
            key.to_string(),
            part_number,
            sink,
            etag,
            scope,
        ))
    }

    /// Abort an upload and discard every part written to it
    pub async fn abort_upload(&self, cancel: &CancellationToken, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        debug!("Aborting upload: bucket={}, key={}", bucket, key);
        let stream_id = validate_upload(bucket, key, upload_id)?;

        let encrypted_path = self
            .keys
            .encrypt_path(bucket, key)
            .map_err(|e| convert_known_errors(e, bucket, key))?;

        race(
            cancel,
            self.metainfo.begin_delete_object(BeginDeleteObjectParams {
                bucket: bucket.to_string(),
                encrypted_path,
                stream_id: Some(stream_id),
                status: ObjectStatus::Uploading,
            }),
        )
        .await
        .map_err(|e| convert_known_errors(e, bucket, key))?;

        info!("Upload aborted: bucket={}, key={}", bucket, key);
        Ok(())
    }

    /// Iterate over the parts uploaded so far
    pub fn list_upload_parts(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        key: &str,
        upload_id: &str,
        options: &ListUploadPartsOptions,
    ) -> PartIterator {
        PartIterator::new(self.clone(), cancel.clone(), bucket, key, upload_id, options)
    }

    /// Iterate over the uncommitted uploads in `bucket`
    pub fn list_uploads(&self, cancel: &CancellationToken, bucket: &str, options: &ListUploadsOptions) -> UploadIterator {
        UploadIterator::new(self.clone(), cancel.clone(), bucket, options)
    }

    /// Information about a committed object, including its custom metadata
    pub async fn stat_object(&self, cancel: &CancellationToken, bucket: &str, key: &str) -> Result<Object> {
        debug!("Stat object: bucket={}, key={}", bucket, key);
        validate(bucket, key)?;

        let encrypted_path = self
            .keys
            .encrypt_path(bucket, key)
            .map_err(|e| convert_known_errors(e, bucket, key))?;

        let raw = race(cancel, self.metainfo.get_object(bucket, &encrypted_path))
            .await
            .map_err(|e| convert_known_errors(e, bucket, key))?;

        let custom = open_metadata(
            &self.keys,
            &raw.encryption_parameters,
            bucket,
            key,
            &raw.encrypted_metadata,
            &raw.encrypted_metadata_encrypted_key,
            &raw.encrypted_metadata_nonce,
        )
        .map_err(|e| convert_known_errors(e, bucket, key))?;

        Ok(Object {
            key: key.to_string(),
            is_prefix: false,
            system: SystemMetadata {
                created: Some(raw.created),
                expires: raw.expires,
                content_length: raw.plain_size,
            },
            custom,
        })
    }
}

/// Run a remote call unless `cancel` fires first
pub(crate) async fn race<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = strand_core::Result<T>>,
) -> strand_core::Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StrandError::Canceled),
        result = call => result,
    }
}

pub(crate) fn validate(bucket: &str, key: &str) -> Result<()> {
    if bucket.is_empty() {
        return Err(ClientError::BucketNameInvalid(bucket.to_string()));
    }
    if key.is_empty() {
        return Err(ClientError::ObjectKeyInvalid(key.to_string()));
    }
    Ok(())
}

pub(crate) fn validate_upload(bucket: &str, key: &str, upload_id: &str) -> Result<StreamId> {
    validate(bucket, key)?;
    if upload_id.is_empty() {
        return Err(ClientError::UploadIdInvalid);
    }
    decode_upload_id(upload_id)
}

pub(crate) fn decode_upload_id(upload_id: &str) -> Result<StreamId> {
    let raw = upload_id::decode(upload_id)?;
    StreamId::from_bytes(&raw).map_err(|_| ClientError::UploadIdInvalid)
}

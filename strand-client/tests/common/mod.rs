//! Shared fixtures for client integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strand_client::Project;
use strand_core::encryption::{EncryptionParameters, Key, KeyStore};
use strand_core::metainfo::*;
use strand_core::stream::{ETagSource, OpenPartParams, PartSink, TransferEngine};
use strand_core::*;
use strand_engine::{LocalMetainfo, LocalTransfer, StorageEngine};
use tokio_util::sync::CancellationToken;

pub const BUCKET: &str = "bucket";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_keys() -> KeyStore {
    KeyStore::with_default_key(Key::from_bytes([7; 32]))
}

/// Project wired to a fresh local engine with one bucket
pub struct LocalProject {
    pub project: Project,
    pub metainfo: LocalMetainfo,
    pub cancel: CancellationToken,
    _temp: tempfile::TempDir,
}

pub fn local_project() -> LocalProject {
    local_project_with_keys(test_keys())
}

pub fn local_project_with_keys(keys: KeyStore) -> LocalProject {
    init_tracing();
    let (engine, temp) = StorageEngine::temp().unwrap();
    let metainfo = LocalMetainfo::new(engine).unwrap();
    metainfo.create_bucket(BUCKET).unwrap();

    let project = Project::new(
        Arc::new(metainfo.clone()),
        Arc::new(LocalTransfer::new(metainfo.clone())),
        keys,
        EncryptionParameters::default(),
    );

    LocalProject {
        project,
        metainfo,
        cancel: CancellationToken::new(),
        _temp: temp,
    }
}

/// Metainfo that counts calls and optionally fails every one of them
#[derive(Default)]
pub struct ScriptedMetainfo {
    pub calls: AtomicUsize,
    pub failure: Option<RpcError>,
}

impl ScriptedMetainfo {
    pub fn failing(failure: RpcError) -> Self {
        ScriptedMetainfo {
            calls: AtomicUsize::new(0),
            failure: Some(failure),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn call(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(failure) => Err(failure.clone().into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MetainfoClient for ScriptedMetainfo {
    async fn begin_object(&self, _params: BeginObjectParams) -> Result<BeginObjectResponse> {
        self.call()?;
        Ok(BeginObjectResponse {
            stream_id: StreamId::from_bytes(&[1; 16])?,
        })
    }

    async fn commit_object(&self, _params: CommitObjectParams) -> Result<()> {
        self.call()
    }

    async fn begin_delete_object(&self, _params: BeginDeleteObjectParams) -> Result<Option<RawObjectItem>> {
        self.call()?;
        Ok(None)
    }

    async fn get_object(&self, _bucket: &str, encrypted_path: &str) -> Result<RawObjectItem> {
        self.call()?;
        Err(RpcError::not_found(format!("object not found: {}", encrypted_path)).into())
    }

    async fn list_objects(&self, _params: ListObjectsParams) -> Result<ObjectList> {
        self.call()?;
        Ok(ObjectList::default())
    }

    async fn list_pending_object_streams(&self, _params: ListPendingObjectStreamsParams) -> Result<ObjectList> {
        self.call()?;
        Ok(ObjectList::default())
    }

    async fn list_segments(&self, _params: ListSegmentsParams) -> Result<SegmentList> {
        self.call()?;
        Ok(SegmentList::default())
    }
}

/// Transfer engine that must never be reached
#[derive(Default)]
pub struct CountingTransfer {
    pub opens: AtomicUsize,
}

#[async_trait]
impl TransferEngine for CountingTransfer {
    async fn open_part(
        &self,
        _params: OpenPartParams,
        _etag: Arc<dyn ETagSource>,
        _cancel: CancellationToken,
    ) -> Result<Box<dyn PartSink>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Err(StrandError::Internal("transfer engine not available".into()))
    }
}

pub fn scripted_project(metainfo: Arc<ScriptedMetainfo>, transfer: Arc<CountingTransfer>) -> Project {
    init_tracing();
    Project::new(metainfo, transfer, test_keys(), EncryptionParameters::default())
}

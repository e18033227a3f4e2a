//! Multipart upload support

use parking_lot::{Mutex as SyncMutex, RwLock};
use std::sync::Arc;
use strand_core::stream::{ETagSource, PartSink};
use strand_core::{Part, StrandError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::convert_known_errors;
use crate::{ClientError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartState {
    Active,
    Committed,
    Aborted,
}

/// ETag handed to the transfer engine. The part upload writes it, the sink
/// reads it when the part is finalized.
#[derive(Debug, Default)]
pub(crate) struct ETagCell(RwLock<Vec<u8>>);

impl ETagSource for ETagCell {
    fn etag(&self) -> Vec<u8> {
        self.0.read().clone()
    }
}

/// One part of a multipart upload.
///
/// `commit` and `abort` are terminal and mutually exclusive: once either
/// ran, both fail with [`ClientError::UploadDone`]. Writes do not take the
/// state lock, so `abort` can interrupt a blocked `write`.
pub struct PartUpload {
    bucket: String,
    key: String,
    state: Mutex<PartState>,
    sink: Box<dyn PartSink>,
    etag: Arc<ETagCell>,
    cancel: CancellationToken,
    part: SyncMutex<Part>,
}

impl std::fmt::Debug for PartUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartUpload")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl PartUpload {
    pub(crate) fn new(
        bucket: String,
        key: String,
        part_number: u32,
        sink: Box<dyn PartSink>,
        etag: Arc<ETagCell>,
        cancel: CancellationToken,
    ) -> Self {
        PartUpload {
            bucket,
            key,
            state: Mutex::new(PartState::Active),
            sink,
            etag,
            cancel,
            part: SyncMutex::new(Part::new(part_number)),
        }
    }

    pub fn part_number(&self) -> u32 {
        self.part.lock().part_number
    }

    /// Write bytes to the part, returning how many were accepted
    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StrandError::Canceled),
            result = self.sink.write(buf) => result,
        };
        result.map_err(|e| self.normalize(e))
    }

    /// Write the whole buffer
    pub async fn write_all(&self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            if n == 0 {
                let err = std::io::Error::from(std::io::ErrorKind::WriteZero);
                return Err(ClientError::Wrapped(err.into()));
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Set the ETag reported for this part. May be called repeatedly until
    /// the part is committed or aborted.
    pub async fn set_etag(&self, etag: impl Into<Vec<u8>>) -> Result<()> {
        let state = self.state.lock().await;
        match *state {
            PartState::Aborted => Err(ClientError::UploadDone("upload aborted")),
            PartState::Committed => Err(ClientError::UploadDone("already committed")),
            PartState::Active => {
                *self.etag.0.write() = etag.into();
                Ok(())
            }
        }
    }

    /// Finalize the part.
    ///
    /// The part is terminal after this call even when flushing fails.
    pub async fn commit(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            PartState::Aborted => return Err(ClientError::UploadDone("already aborted")),
            PartState::Committed => return Err(ClientError::UploadDone("already committed")),
            PartState::Active => {}
        }
        *state = PartState::Committed;

        let closed = self.sink.close().await;
        let released = self.sink.release().await;
        StrandError::combine(closed, released).map_err(|e| self.normalize(e))?;

        info!("Part committed: bucket={}, key={}, part={}", self.bucket, self.key, self.part_number());
        Ok(())
    }

    /// Discard the part, cancelling any write in flight
    pub async fn abort(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            PartState::Committed => return Err(ClientError::UploadDone("already committed")),
            PartState::Aborted => return Err(ClientError::UploadDone("already aborted")),
            PartState::Active => {}
        }
        *state = PartState::Aborted;
        self.cancel.cancel();

        let aborted = self.sink.abort().await;
        let released = self.sink.release().await;
        StrandError::combine(aborted, released).map_err(|e| self.normalize(e))?;

        debug!("Part aborted: bucket={}, key={}, part={}", self.bucket, self.key, self.part_number());
        Ok(())
    }

    /// Latest known state of the part. Size and ETag stay empty until the
    /// sink has flushed something.
    pub fn info(&self) -> Part {
        let mut part = self.part.lock();
        if let Some(current) = self.sink.part() {
            part.size = current.size;
            part.modified = current.modified;
            part.etag = current.etag;
        }
        part.clone()
    }

    fn normalize(&self, err: StrandError) -> ClientError {
        convert_known_errors(err, &self.bucket, &self.key)
    }
}

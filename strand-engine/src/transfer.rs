//! Local transfer engine
//!
//! Each part is buffered in memory and stored as a single segment when the
//! sink is closed.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use strand_core::metainfo::SegmentPosition;
use strand_core::stream::{ETagSource, OpenPartParams, PartSink, TransferEngine};
use strand_core::*;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::LocalMetainfo;

/// [`TransferEngine`] storing segments through a [`LocalMetainfo`].
///
/// Closing a sink writes and fsyncs synchronously, blocking the runtime
/// thread it runs on.
#[derive(Clone)]
pub struct LocalTransfer {
    metainfo: LocalMetainfo,
}

impl LocalTransfer {
    pub fn new(metainfo: LocalMetainfo) -> Self {
        LocalTransfer { metainfo }
    }
}

#[async_trait]
impl TransferEngine for LocalTransfer {
    async fn open_part(
        &self,
        params: OpenPartParams,
        etag: Arc<dyn ETagSource>,
        cancel: CancellationToken,
    ) -> Result<Box<dyn PartSink>> {
        if self.metainfo.pending_object(&params.stream_id)?.is_none() {
            return Err(RpcError::not_found(format!("object not found: {}", params.key)).into());
        }

        debug!(
            "Part opened: bucket={}, stream={}, part={}",
            params.bucket, params.stream_id, params.part_number
        );
        Ok(Box::new(LocalPartSink {
            metainfo: self.metainfo.clone(),
            params,
            etag,
            cancel,
            state: Mutex::new(SinkState::default()),
        }))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Phase {
    #[default]
    Open,
    Closed,
    Aborted,
}

#[derive(Default)]
struct SinkState {
    buffer: Vec<u8>,
    phase: Phase,
    part: Option<Part>,
}

pub struct LocalPartSink {
    metainfo: LocalMetainfo,
    params: OpenPartParams,
    etag: Arc<dyn ETagSource>,
    cancel: CancellationToken,
    state: Mutex<SinkState>,
}

impl LocalPartSink {
    fn check_open(&self, state: &SinkState) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(StrandError::Canceled);
        }
        match state.phase {
            Phase::Open => Ok(()),
            Phase::Closed => Err(StrandError::Internal("part sink is closed".to_string())),
            Phase::Aborted => Err(StrandError::Internal("part sink is aborted".to_string())),
        }
    }
}

#[async_trait]
impl PartSink for LocalPartSink {
    async fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        self.check_open(&state)?;
        state.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn close(&self) -> Result<()> {
        let data = {
            let mut state = self.state.lock();
            self.check_open(&state)?;
            state.phase = Phase::Closed;
            std::mem::take(&mut state.buffer)
        };

        let position = SegmentPosition {
            part_number: self.params.part_number as i32,
            index: 0,
        };
        let record = self
            .metainfo
            .put_segment(&self.params.stream_id, position, &data, self.etag.etag())?;

        self.state.lock().part = Some(Part {
            part_number: self.params.part_number,
            size: record.plain_size,
            modified: Some(record.created_at),
            etag: record.etag,
        });
        Ok(())
    }

    async fn abort(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.phase = Phase::Aborted;
        state.buffer.clear();
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        Ok(())
    }

    fn part(&self) -> Option<Part> {
        self.state.lock().part.clone()
    }
}

//! Segment transfer interface
//!
//! The transfer engine splits part bytes into segments and pushes them to
//! storage. The coordinator only sees a sequential byte sink per part.

use crate::{Part, Result, StreamId};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Supplies the integrity tag of a part when the sink finalizes it
pub trait ETagSource: Send + Sync {
    fn etag(&self) -> Vec<u8>;
}

#[derive(Debug, Clone)]
pub struct OpenPartParams {
    pub bucket: String,
    pub key: String,
    pub stream_id: StreamId,
    pub part_number: u32,
}

/// Sequential byte sink for a single part.
///
/// Implementations synchronize internally; `write` is called without any
/// lock held by the caller and must reject writes after `close`/`abort`.
#[async_trait]
pub trait PartSink: Send + Sync {
    async fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Flush buffered bytes and finalize the part
    async fn close(&self) -> Result<()>;

    /// Discard the part
    async fn abort(&self) -> Result<()>;

    /// Release stream resources held for this part
    async fn release(&self) -> Result<()>;

    /// Latest known state of the part; `None` until anything was flushed
    fn part(&self) -> Option<Part>;
}

#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Open a sink bound to `(stream_id, part_number)`. The sink must stop
    /// and fail pending work once `cancel` fires.
    async fn open_part(
        &self,
        params: OpenPartParams,
        etag: Arc<dyn ETagSource>,
        cancel: CancellationToken,
    ) -> Result<Box<dyn PartSink>>;
}

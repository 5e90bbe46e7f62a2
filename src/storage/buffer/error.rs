use thiserror::Error;

use crate::common::types::{FrameId, PageId};
use crate::storage::disk::DiskManagerError;

#[derive(Error, Debug)]
pub enum BufferPoolError {
    #[error("Page {0} not found in buffer pool")]
    PageNotFound(PageId),

    #[error("Page {0} is pinned")]
    PagePinned(PageId),

    #[error("Page {0} is not pinned")]
    PageNotPinned(PageId),

    #[error("Buffer pool is full: all frames are pinned")]
    BufferPoolFull,

    #[error("Frame {0} is not evictable")]
    FrameNotEvictable(FrameId),

    #[error("Flushing page {0} to disk failed")]
    FlushFailed(PageId),

    #[error("Reading page {0} from disk failed")]
    ReadFailed(PageId),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Disk manager error: {0}")]
    DiskManagerError(#[from] DiskManagerError),
}

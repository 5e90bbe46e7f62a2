use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type. Page 0 is the file metadata page and is never handed out,
/// so 0 doubles as the invalid sentinel.
pub type PageId = u32;

pub const INVALID_PAGE_ID: PageId = 0;

/// Buffer pool frame ID type
pub type FrameId = u32;

/// Logical timestamp type (commit timestamps and transaction-temporary ids)
pub type Timestamp = u64;

/// Transaction ID type
pub type TxnId = u64;

/// Table OID type
pub type TableOid = u32;

/// Index OID type
pub type IndexOid = u32;

/// Timestamps at or above this value are transaction-temporary: they encode
/// the id of the live transaction that most recently wrote the tuple rather
/// than a commit timestamp.
pub const TXN_START_ID: u64 = 1 << 62;

/// Page structure: a fixed-size byte buffer plus its identity.
#[derive(Debug, Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
        }
    }

    /// Reset the page to an all-zero buffer with no identity.
    pub fn reset(&mut self) {
        self.data = [0; PAGE_SIZE];
        self.page_id = INVALID_PAGE_ID;
    }
}

/// Smart pointer to a page; the RwLock is the page latch.
pub type PagePtr = Arc<RwLock<Page>>;

/// Record identifier: names a tuple slot within the table heap.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u32,
}

impl Rid {
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.page_id, self.slot)
    }
}

pub mod config;
pub mod types;

pub use config::{BufferPoolConfig, HashTableConfig};
pub use types::{
    FrameId, IndexOid, Page, PageId, PagePtr, Rid, TableOid, Timestamp, TxnId, INVALID_PAGE_ID,
    PAGE_SIZE, TXN_START_ID,
};

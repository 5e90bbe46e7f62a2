// Export public modules
pub mod catalog;
pub mod common;
pub mod execution;
pub mod index;
pub mod optimizer;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use catalog::Catalog;
pub use execution::{ExecutorContext, ExecutorFactory};
pub use index::hash::DiskExtendibleHashTable;
pub use storage::buffer::{BufferPoolError, BufferPoolManager};
pub use storage::disk::DiskManager;
pub use storage::table::TableHeap;
pub use transaction::{IsolationLevel, Transaction, TransactionManager};

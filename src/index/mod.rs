pub mod hash;

pub use hash::{DiskExtendibleHashTable, IndexError};

pub mod manager;
pub mod transaction;
pub mod watermark;

pub use manager::TransactionManager;
pub use transaction::{
    IsolationLevel, Transaction, TransactionError, TransactionState, UndoLink, UndoLog,
    VersionLink,
};
pub use watermark::Watermark;

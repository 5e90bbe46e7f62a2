use thiserror::Error;

use crate::common::types::{IndexOid, Rid, TableOid};
use crate::index::hash::IndexError;
use crate::storage::buffer::BufferPoolError;
use crate::storage::table::HeapError;
use crate::transaction::TransactionError;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Table {0} not found")]
    TableNotFound(TableOid),

    #[error("Index {0} not found")]
    IndexNotFound(IndexOid),

    #[error("Write-write conflict on {0}")]
    WriteWriteConflict(Rid),

    #[error("Version link of {0} is held by another writer")]
    VersionLinkContended(Rid),

    #[error("Key already exists in a unique index")]
    KeyAlreadyExists,

    #[error("Index and table heap disagree at {0}")]
    IndexHeapMismatch(Rid),

    #[error("Transaction is tainted; only abort is allowed")]
    TransactionTainted,

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Heap error: {0}")]
    Heap(#[from] HeapError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

pub type ExecResult<T> = Result<T, ExecutionError>;

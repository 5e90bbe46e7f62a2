// Transaction
//
// A transaction carries its snapshot read timestamp, its append-only undo
// log vector, and the set of RIDs it has written. Everything mutable is
// behind interior locks so executors can share the transaction through an
// Arc.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Rid, TableOid, Timestamp, TxnId, TXN_START_ID};
use crate::storage::table::{DataValue, HeapError, Tuple};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    Snapshot,
    Serializable,
}

/// Transaction states. TAINTED marks an unrecoverable executor failure;
/// the only legal transition out of it is ABORTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Running,
    Tainted,
    Committed,
    Aborted,
}

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {0} is not in a state that allows this operation")]
    InvalidState(u64),

    #[error("Heap error: {0}")]
    Heap(#[from] HeapError),
}

/// Pointer to one undo entry inside a transaction's log vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoLink {
    pub txn_id: TxnId,
    pub log_idx: usize,
}

/// One recorded version delta. `modified_fields` says which columns the
/// partial tuple carries; unchanged columns are omitted. `ts` is the
/// timestamp of the version this log restores.
#[derive(Debug, Clone)]
pub struct UndoLog {
    pub is_deleted: bool,
    pub modified_fields: Vec<bool>,
    pub tuple: Tuple,
    pub ts: Timestamp,
    pub prev: Option<UndoLink>,
}

impl UndoLog {
    /// Overlay this log's partial columns onto a full value vector.
    pub fn overlay(&self, values: &mut [DataValue]) {
        let mut partial_idx = 0;
        for (i, &modified) in self.modified_fields.iter().enumerate() {
            if modified {
                values[i] = self.tuple.value(partial_idx).clone();
                partial_idx += 1;
            }
        }
    }
}

/// Per-RID head of the version chain plus the optimistic write lock bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionLink {
    pub head: Option<UndoLink>,
    pub in_progress: bool,
}

pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    read_ts: Timestamp,
    /// 0 until committed
    commit_ts: AtomicU64,
    state: Mutex<TransactionState>,
    undo_logs: Mutex<Vec<UndoLog>>,
    write_set: Mutex<HashMap<TableOid, HashSet<Rid>>>,
}

impl Transaction {
    pub(crate) fn new(id: TxnId, isolation_level: IsolationLevel, read_ts: Timestamp) -> Self {
        Self {
            id,
            isolation_level,
            read_ts,
            commit_ts: AtomicU64::new(0),
            state: Mutex::new(TransactionState::Running),
            undo_logs: Mutex::new(Vec::new()),
            write_set: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Small sequence number for display (ids live in the temporary
    /// timestamp range).
    pub fn readable_id(&self) -> u64 {
        self.id - TXN_START_ID
    }

    /// The transaction-temporary timestamp this transaction stamps into
    /// tuples it writes. Identical to the id.
    pub fn temp_ts(&self) -> Timestamp {
        self.id
    }

    pub fn read_ts(&self) -> Timestamp {
        self.read_ts
    }

    pub fn commit_ts(&self) -> Option<Timestamp> {
        match self.commit_ts.load(Ordering::SeqCst) {
            0 => None,
            ts => Some(ts),
        }
    }

    pub(crate) fn set_commit_ts(&self, ts: Timestamp) {
        self.commit_ts.store(ts, Ordering::SeqCst);
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    /// Mark the transaction unrecoverable. Further DML must fail fast and
    /// the owner is expected to abort.
    pub fn set_tainted(&self) {
        let mut state = self.state.lock();
        if *state == TransactionState::Running {
            log::debug!("txn {} tainted", self.readable_id());
            *state = TransactionState::Tainted;
        }
    }

    /// Append an undo log, returning a link naming it.
    pub fn append_undo_log(&self, log: UndoLog) -> UndoLink {
        let mut logs = self.undo_logs.lock();
        logs.push(log);
        UndoLink {
            txn_id: self.id,
            log_idx: logs.len() - 1,
        }
    }

    /// Replace an undo log in place (self-modification merges).
    pub fn modify_undo_log(&self, log_idx: usize, log: UndoLog) {
        let mut logs = self.undo_logs.lock();
        if log_idx < logs.len() {
            logs[log_idx] = log;
        }
    }

    pub fn undo_log(&self, log_idx: usize) -> Option<UndoLog> {
        self.undo_logs.lock().get(log_idx).cloned()
    }

    pub fn undo_log_count(&self) -> usize {
        self.undo_logs.lock().len()
    }

    pub(crate) fn clear_undo_logs(&self) {
        self.undo_logs.lock().clear();
    }

    pub fn append_write_set(&self, table: TableOid, rid: Rid) {
        self.write_set
            .lock()
            .entry(table)
            .or_default()
            .insert(rid);
    }

    pub fn write_set_snapshot(&self) -> Vec<(TableOid, Vec<Rid>)> {
        self.write_set
            .lock()
            .iter()
            .map(|(&oid, rids)| {
                let mut rids: Vec<Rid> = rids.iter().copied().collect();
                rids.sort();
                (oid, rids)
            })
            .collect()
    }
}

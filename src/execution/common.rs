// Execution Common
//
// The MVCC glue shared by scan and DML executors: read visibility and
// tuple reconstruction, undo-log generation and merging, write-write
// conflict detection, and the version-link write protocol.

use std::fmt::Write as _;

use crate::catalog::TableInfo;
use crate::common::types::{Rid, Timestamp, TXN_START_ID};
use crate::execution::error::{ExecResult, ExecutionError};
use crate::execution::executor::ExecutorContext;
use crate::storage::table::{Tuple, TupleMeta};
use crate::transaction::{Transaction, TransactionManager, TransactionState, UndoLog};

/// A writer conflicts when the current version is newer than its snapshot
/// and was not written by itself.
pub fn check_ww_conflict(meta: &TupleMeta, txn: &Transaction) -> bool {
    meta.ts > txn.read_ts() && meta.ts != txn.temp_ts()
}

/// The current version belongs to this transaction.
pub fn check_self_modify(meta: &TupleMeta, txn: &Transaction) -> bool {
    meta.ts == txn.temp_ts()
}

/// Replay undo logs (newest first) over the current tuple to materialize
/// an older version. Returns None when that version is a tombstone.
pub fn reconstruct_tuple(
    base_tuple: &Tuple,
    base_meta: &TupleMeta,
    undo_logs: &[UndoLog],
) -> Option<Tuple> {
    let mut values = base_tuple.values().to_vec();
    let mut is_deleted = base_meta.is_deleted;
    for log in undo_logs {
        if log.is_deleted {
            is_deleted = true;
            continue;
        }
        is_deleted = false;
        log.overlay(&mut values);
    }
    if is_deleted {
        None
    } else {
        Some(Tuple::new(values))
    }
}

/// Walk the version chain from the head, collecting logs up to and
/// including the first one at or below `read_ts`. Returns None when the
/// chain ends before reaching a version old enough: the tuple is invisible
/// to that reader.
pub fn collect_undo_logs(
    txn_mgr: &TransactionManager,
    rid: Rid,
    read_ts: Timestamp,
) -> Option<Vec<UndoLog>> {
    let mut logs = Vec::new();
    let mut link = txn_mgr.undo_link(rid);
    while let Some(l) = link {
        let log = txn_mgr.undo_log(l)?;
        link = log.prev;
        let ts = log.ts;
        logs.push(log);
        if ts <= read_ts {
            return Some(logs);
        }
    }
    None
}

/// The read-visibility rule: the current tuple when committed before the
/// snapshot or written by the reader itself, otherwise the reconstruction
/// of the newest chain version at or below the snapshot.
pub fn visible_tuple(
    txn_mgr: &TransactionManager,
    txn: &Transaction,
    meta: &TupleMeta,
    tuple: &Tuple,
    rid: Rid,
) -> Option<Tuple> {
    if meta.ts <= txn.read_ts() || meta.ts == txn.temp_ts() {
        if meta.is_deleted {
            None
        } else {
            Some(tuple.clone())
        }
    } else {
        let logs = collect_undo_logs(txn_mgr, rid, txn.read_ts())?;
        reconstruct_tuple(tuple, meta, &logs)
    }
}

/// Build the undo log for a first mutation of a version: a tombstone
/// marker when the old version was deleted, a full snapshot when the new
/// version is a delete, otherwise a delta of only the changed columns.
pub fn generate_undo_log(
    old_tuple: &Tuple,
    new_tuple: Option<&Tuple>,
    old_is_deleted: bool,
    ts: Timestamp,
) -> UndoLog {
    if old_is_deleted {
        return UndoLog {
            is_deleted: true,
            modified_fields: Vec::new(),
            tuple: Tuple::default(),
            ts,
            prev: None,
        };
    }
    let new_tuple = match new_tuple {
        Some(t) => t,
        None => {
            // Deleting a live row: the undo log must restore every column.
            return UndoLog {
                is_deleted: false,
                modified_fields: vec![true; old_tuple.len()],
                tuple: old_tuple.clone(),
                ts,
                prev: None,
            };
        }
    };

    let mut modified_fields = Vec::with_capacity(old_tuple.len());
    let mut partial = Vec::new();
    for i in 0..old_tuple.len() {
        if old_tuple.value(i) != new_tuple.value(i) {
            modified_fields.push(true);
            partial.push(old_tuple.value(i).clone());
        } else {
            modified_fields.push(false);
        }
    }
    UndoLog {
        is_deleted: false,
        modified_fields,
        tuple: Tuple::new(partial),
        ts,
        prev: None,
    }
}

/// Fold a further self-modification into the existing undo log for the
/// same version. The log keeps describing the version before this
/// transaction touched the row, so already-recorded columns win.
pub fn merge_undo_log(
    old_log: &UndoLog,
    old_tuple: &Tuple,
    new_tuple: Option<&Tuple>,
    new_is_deleted: bool,
) -> UndoLog {
    if old_log.is_deleted {
        return old_log.clone();
    }

    if new_is_deleted {
        // Everything must be restorable; fill the gaps from the current
        // tuple (still this transaction's previous write).
        let mut values = old_tuple.values().to_vec();
        old_log.overlay(&mut values);
        return UndoLog {
            is_deleted: false,
            modified_fields: vec![true; values.len()],
            tuple: Tuple::new(values),
            ts: old_log.ts,
            prev: old_log.prev,
        };
    }

    let new_tuple = match new_tuple {
        Some(t) => t,
        None => return old_log.clone(),
    };

    let mut modified_fields = Vec::with_capacity(old_tuple.len());
    let mut partial = Vec::new();
    let mut old_partial_idx = 0;
    for i in 0..old_tuple.len() {
        if old_log.modified_fields.get(i).copied().unwrap_or(false) {
            modified_fields.push(true);
            partial.push(old_log.tuple.value(old_partial_idx).clone());
            old_partial_idx += 1;
        } else if old_tuple.value(i) != new_tuple.value(i) {
            modified_fields.push(true);
            partial.push(old_tuple.value(i).clone());
        } else {
            modified_fields.push(false);
        }
    }
    UndoLog {
        is_deleted: false,
        modified_fields,
        tuple: Tuple::new(partial),
        ts: old_log.ts,
        prev: old_log.prev,
    }
}

/// DML executors must fail fast once the transaction left RUNNING.
pub fn ensure_running(txn: &Transaction) -> ExecResult<()> {
    if txn.state() != TransactionState::Running {
        return Err(ExecutionError::TransactionTainted);
    }
    Ok(())
}

/// The uniform write protocol for mutating one RID (update, delete, and
/// insert over a tombstone). `new_tuple = None` marks a delete.
pub fn apply_mvcc_mutation(
    ctx: &ExecutorContext,
    table: &TableInfo,
    rid: Rid,
    new_tuple: Option<&Tuple>,
) -> ExecResult<()> {
    let txn = &ctx.txn;
    let txn_mgr = &ctx.txn_mgr;
    let (meta, old_tuple) = table.heap.get_tuple(rid)?;

    if check_self_modify(&meta, txn) {
        // Second write of the same version by the same transaction: merge
        // into the existing log instead of growing the chain.
        if let Some(link) = txn_mgr.undo_link(rid) {
            if link.txn_id == txn.id() {
                if let Some(old_log) = txn.undo_log(link.log_idx) {
                    let merged =
                        merge_undo_log(&old_log, &old_tuple, new_tuple, new_tuple.is_none());
                    txn.modify_undo_log(link.log_idx, merged);
                }
            }
        }
        write_in_place(table, rid, new_tuple, txn)?;
    } else {
        if !txn_mgr.try_mark_in_progress(rid) {
            txn.set_tainted();
            return Err(ExecutionError::VersionLinkContended(rid));
        }
        // Re-check under the write lock: the version may have moved since
        // the first read.
        let meta = table.heap.get_tuple_meta(rid)?;
        if check_ww_conflict(&meta, txn) {
            txn_mgr.clear_in_progress(rid);
            txn.set_tainted();
            return Err(ExecutionError::WriteWriteConflict(rid));
        }

        let mut log = generate_undo_log(&old_tuple, new_tuple, meta.is_deleted, meta.ts);
        log.prev = txn_mgr.undo_link(rid);
        let link = txn.append_undo_log(log);
        txn_mgr.publish_head_in_progress(rid, Some(link));
        write_in_place(table, rid, new_tuple, txn)?;
        txn_mgr.clear_in_progress(rid);
    }

    txn.append_write_set(table.oid, rid);
    Ok(())
}

fn write_in_place(
    table: &TableInfo,
    rid: Rid,
    new_tuple: Option<&Tuple>,
    txn: &Transaction,
) -> ExecResult<()> {
    match new_tuple {
        Some(t) => {
            table
                .heap
                .update_tuple_in_place(TupleMeta::new(txn.temp_ts(), false), t, rid, None)?
        }
        None => table
            .heap
            .update_tuple_meta(TupleMeta::new(txn.temp_ts(), true), rid)?,
    }
    Ok(())
}

/// Render a table's version chains for debugging; callers usually hand the
/// result to `log::debug!`.
pub fn format_version_chain(txn_mgr: &TransactionManager, table: &TableInfo) -> String {
    let mut out = String::new();
    for (rid, meta, tuple) in table.heap.iter() {
        let ts = format_ts(meta.ts);
        let _ = writeln!(
            out,
            "RID={} ts={}{} tuple={}",
            rid,
            ts,
            if meta.is_deleted { " <del marker>" } else { "" },
            tuple
        );
        let mut link = txn_mgr.undo_link(rid);
        while let Some(l) = link {
            match txn_mgr.undo_log(l) {
                Some(log) => {
                    let _ = writeln!(
                        out,
                        "  txn{}@{} {} ts={}{}",
                        l.txn_id - TXN_START_ID,
                        l.log_idx,
                        log.tuple,
                        log.ts,
                        if log.is_deleted { " <del>" } else { "" }
                    );
                    link = log.prev;
                }
                None => {
                    let _ = writeln!(out, "  txn{}@{} <reclaimed>", l.txn_id - TXN_START_ID, l.log_idx);
                    break;
                }
            }
        }
    }
    out
}

fn format_ts(ts: Timestamp) -> String {
    if ts >= TXN_START_ID {
        format!("txn{}", ts - TXN_START_ID)
    } else {
        ts.to_string()
    }
}

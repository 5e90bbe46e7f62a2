// Transaction Manager
//
// Hands out read and commit timestamps, tracks per-RID version chains,
// and garbage-collects versions nothing can see anymore. Commits are
// totally ordered by the commit mutex; writes to a single version chain
// are ordered by the in_progress bit on its head.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::catalog::Catalog;
use crate::common::types::{Rid, Timestamp, TxnId, TXN_START_ID};
use crate::storage::table::{Tuple, TupleMeta};
use crate::transaction::transaction::{
    IsolationLevel, Transaction, TransactionError, TransactionState, UndoLink, UndoLog,
    VersionLink,
};
use crate::transaction::watermark::Watermark;

pub struct TransactionManager {
    next_txn_id: AtomicU64,
    last_commit_ts: AtomicU64,
    txn_map: RwLock<HashMap<TxnId, Arc<Transaction>>>,
    running_txns: Mutex<Watermark>,
    version_links: RwLock<HashMap<Rid, VersionLink>>,
    commit_mutex: Mutex<()>,
    catalog: Arc<RwLock<Catalog>>,
}

impl TransactionManager {
    pub fn new(catalog: Arc<RwLock<Catalog>>) -> Self {
        Self {
            next_txn_id: AtomicU64::new(TXN_START_ID),
            last_commit_ts: AtomicU64::new(0),
            txn_map: RwLock::new(HashMap::new()),
            running_txns: Mutex::new(Watermark::new(0)),
            version_links: RwLock::new(HashMap::new()),
            commit_mutex: Mutex::new(()),
            catalog,
        }
    }

    /// Start a transaction: assign an id, snapshot the last commit
    /// timestamp as its read timestamp, register it as running.
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let mut txn_map = self.txn_map.write();
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst) + 1;
        let read_ts = self.last_commit_ts.load(Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(id, isolation_level, read_ts));
        txn_map.insert(id, txn.clone());
        self.running_txns.lock().add_txn(read_ts);
        debug!("txn {} begins at read_ts {}", txn.readable_id(), read_ts);
        txn
    }

    /// Serializable validation. Deliberately a stub that accepts every
    /// transaction; the precise validation rule is left undefined.
    pub fn verify_txn(&self, _txn: &Transaction) -> bool {
        true
    }

    /// Commit: stamp every written tuple with the new commit timestamp and
    /// publish it, all under the commit mutex.
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        let _commit_guard = self.commit_mutex.lock();

        if txn.state() != TransactionState::Running {
            return Err(TransactionError::InvalidState(txn.readable_id()));
        }
        if txn.isolation_level() == IsolationLevel::Serializable && !self.verify_txn(txn) {
            drop(_commit_guard);
            self.abort(txn)?;
            return Err(TransactionError::InvalidState(txn.readable_id()));
        }

        let commit_ts = self.last_commit_ts.load(Ordering::SeqCst) + 1;

        {
            let catalog = self.catalog.read();
            for (table_oid, rids) in txn.write_set_snapshot() {
                let Some(table) = catalog.table(table_oid) else {
                    continue;
                };
                for rid in rids {
                    let meta = table.heap.get_tuple_meta(rid)?;
                    table
                        .heap
                        .update_tuple_meta(TupleMeta::new(commit_ts, meta.is_deleted), rid)?;
                }
            }
        }

        txn.set_commit_ts(commit_ts);
        self.last_commit_ts.store(commit_ts, Ordering::SeqCst);
        txn.set_state(TransactionState::Committed);

        let mut running = self.running_txns.lock();
        running.update_commit_ts(commit_ts);
        running.remove_txn(txn.read_ts());
        debug!("txn {} committed at ts {}", txn.readable_id(), commit_ts);
        Ok(())
    }

    /// Abort: rewind every tuple this transaction still owns back to its
    /// previous version using the transaction's own undo logs, then
    /// unregister the transaction.
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        match txn.state() {
            TransactionState::Running | TransactionState::Tainted => {}
            _ => return Err(TransactionError::InvalidState(txn.readable_id())),
        }

        {
            let catalog = self.catalog.read();
            for (table_oid, rids) in txn.write_set_snapshot() {
                let Some(table) = catalog.table(table_oid) else {
                    continue;
                };
                for rid in rids {
                    let (meta, tuple) = table.heap.get_tuple(rid)?;
                    if meta.ts != txn.temp_ts() {
                        // A later writer already replaced this version.
                        continue;
                    }
                    match self.undo_link(rid) {
                        Some(link) if link.txn_id == txn.id() => {
                            let Some(log) = txn.undo_log(link.log_idx) else {
                                continue;
                            };
                            if log.is_deleted {
                                table
                                    .heap
                                    .update_tuple_meta(TupleMeta::new(log.ts, true), rid)?;
                            } else {
                                let mut values = tuple.values().to_vec();
                                log.overlay(&mut values);
                                table.heap.update_tuple_in_place(
                                    TupleMeta::new(log.ts, false),
                                    &Tuple::new(values),
                                    rid,
                                    None,
                                )?;
                            }
                            self.update_undo_link(rid, log.prev);
                        }
                        _ => {
                            // Fresh insert with no undo history: make the
                            // slot a never-visible tombstone.
                            table.heap.update_tuple_meta(TupleMeta::new(0, true), rid)?;
                            self.update_undo_link(rid, None);
                        }
                    }
                }
            }
        }

        txn.set_state(TransactionState::Aborted);
        self.running_txns.lock().remove_txn(txn.read_ts());
        debug!("txn {} aborted", txn.readable_id());
        Ok(())
    }

    /// Sweep every table: count undo logs no running transaction can reach
    /// and drop finished transactions whose logs are all unreachable.
    pub fn garbage_collection(&self) {
        let watermark = self.watermark();
        let mut invisible: HashMap<TxnId, usize> = HashMap::new();

        {
            let catalog = self.catalog.read();
            for table_name in catalog.table_names() {
                let Some(table) = catalog.table_by_name(&table_name) else {
                    continue;
                };
                for (rid, meta, _tuple) in table.heap.iter() {
                    let mut unreachable = meta.ts <= watermark;
                    let mut link = self.undo_link(rid);
                    if unreachable {
                        // The newest version already satisfies every
                        // reader; nothing below the head stays reachable.
                        self.update_undo_link(rid, None);
                    }
                    while let Some(l) = link {
                        let Some(log) = self.undo_log(l) else {
                            break;
                        };
                        if unreachable {
                            *invisible.entry(l.txn_id).or_insert(0) += 1;
                        }
                        if log.ts <= watermark {
                            unreachable = true;
                        }
                        link = log.prev;
                    }
                }
            }
        }

        let mut txn_map = self.txn_map.write();
        txn_map.retain(|id, txn| {
            let finished = matches!(
                txn.state(),
                TransactionState::Committed | TransactionState::Aborted
            );
            let collectible = finished
                && invisible.get(id).copied().unwrap_or(0) == txn.undo_log_count();
            if collectible {
                debug!("gc reclaims txn {}", txn.readable_id());
                txn.clear_undo_logs();
            }
            !collectible
        });
    }

    pub fn watermark(&self) -> Timestamp {
        self.running_txns.lock().watermark()
    }

    pub fn last_commit_ts(&self) -> Timestamp {
        self.last_commit_ts.load(Ordering::SeqCst)
    }

    pub fn txn(&self, id: TxnId) -> Option<Arc<Transaction>> {
        self.txn_map.read().get(&id).cloned()
    }

    pub fn txn_count(&self) -> usize {
        self.txn_map.read().len()
    }

    pub fn catalog(&self) -> &Arc<RwLock<Catalog>> {
        &self.catalog
    }

    // Version-link surface. All updates happen under the map's write lock,
    // which makes the check-and-set atomic.

    pub fn version_link(&self, rid: Rid) -> Option<VersionLink> {
        self.version_links.read().get(&rid).copied()
    }

    pub fn undo_link(&self, rid: Rid) -> Option<UndoLink> {
        self.version_link(rid).and_then(|v| v.head)
    }

    /// Set the chain head with the in_progress bit cleared.
    pub fn update_undo_link(&self, rid: Rid, head: Option<UndoLink>) {
        let mut links = self.version_links.write();
        let entry = links.entry(rid).or_default();
        entry.head = head;
        entry.in_progress = false;
    }

    /// Optimistic write lock: succeeds only when no other writer holds the
    /// link.
    pub fn try_mark_in_progress(&self, rid: Rid) -> bool {
        let mut links = self.version_links.write();
        let entry = links.entry(rid).or_default();
        if entry.in_progress {
            return false;
        }
        entry.in_progress = true;
        true
    }

    /// Publish a new head while keeping the write lock held.
    pub fn publish_head_in_progress(&self, rid: Rid, head: Option<UndoLink>) {
        let mut links = self.version_links.write();
        let entry = links.entry(rid).or_default();
        entry.head = head;
        entry.in_progress = true;
    }

    pub fn clear_in_progress(&self, rid: Rid) {
        let mut links = self.version_links.write();
        if let Some(entry) = links.get_mut(&rid) {
            entry.in_progress = false;
        }
    }

    /// Resolve an undo link to its log through the transaction map.
    pub fn undo_log(&self, link: UndoLink) -> Option<UndoLog> {
        let txn = self.txn_map.read().get(&link.txn_id).cloned()?;
        txn.undo_log(link.log_idx)
    }
}

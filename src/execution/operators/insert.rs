// Insert Operator
//
// Drains its child and appends each row through the MVCC write protocol.
// A primary-key collision with a live row taints the transaction; a
// collision with a tombstone turns into an insert-after-delete update of
// that slot. Emits a single count row.

use std::sync::Arc;

use crate::catalog::{IndexInfo, Schema, TableInfo};
use crate::common::types::Rid;
use crate::execution::common::{apply_mvcc_mutation, ensure_running};
use crate::execution::error::{ExecResult, ExecutionError};
use crate::execution::executor::{Executor, ExecutorContext};
use crate::storage::table::{DataValue, Tuple, TupleMeta};

pub struct InsertExecutor {
    ctx: Arc<ExecutorContext>,
    table: Arc<TableInfo>,
    indexes: Vec<Arc<IndexInfo>>,
    primary_index: Option<Arc<IndexInfo>>,
    child: Box<dyn Executor>,
    output: Schema,
    done: bool,
}

impl InsertExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        table: Arc<TableInfo>,
        indexes: Vec<Arc<IndexInfo>>,
        child: Box<dyn Executor>,
        output: Schema,
    ) -> Self {
        let primary_index = indexes.iter().find(|i| i.is_primary).cloned();
        Self {
            ctx,
            table,
            indexes,
            primary_index,
            child,
            output,
            done: false,
        }
    }

    /// Fresh append: heap insert, index maintenance, empty version link.
    fn insert_fresh(&self, tuple: &Tuple) -> ExecResult<Rid> {
        let txn = &self.ctx.txn;
        let rid = self
            .table
            .heap
            .insert_tuple(TupleMeta::new(txn.temp_ts(), false), tuple)?;
        for index in &self.indexes {
            let key = index.key_from_tuple(tuple);
            if !index.index.insert(&key, &rid)? {
                // Another transaction claimed the key between our probe and
                // this insert: hide the freshly written tuple again.
                self.table
                    .heap
                    .update_tuple_meta(TupleMeta::new(txn.temp_ts(), true), rid)?;
                txn.set_tainted();
                return Err(ExecutionError::KeyAlreadyExists);
            }
        }
        self.ctx.txn_mgr.update_undo_link(rid, None);
        txn.append_write_set(self.table.oid, rid);
        Ok(rid)
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> ExecResult<()> {
        self.done = false;
        self.child.init()
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        ensure_running(&self.ctx.txn)?;

        let mut count = 0i64;
        while let Some((tuple, _)) = self.child.next()? {
            if let Some(pk) = &self.primary_index {
                let key = pk.key_from_tuple(&tuple);
                if let Some(existing) = pk.index.get(&key)? {
                    let meta = self.table.heap.get_tuple_meta(existing)?;
                    if !meta.is_deleted {
                        self.ctx.txn.set_tainted();
                        return Err(ExecutionError::KeyAlreadyExists);
                    }
                    // Insert-after-delete: revive the tombstoned slot under
                    // the regular write protocol.
                    apply_mvcc_mutation(&self.ctx, &self.table, existing, Some(&tuple))?;
                    count += 1;
                    continue;
                }
            }
            self.insert_fresh(&tuple)?;
            count += 1;
        }

        Ok(Some((
            Tuple::new(vec![DataValue::Integer(count)]),
            Rid::default(),
        )))
    }

    fn output_schema(&self) -> &Schema {
        &self.output
    }
}

// Update Operator
//
// Non-key updates mutate the tuple in place under the MVCC write
// protocol. An update that changes a primary-key column runs as a delete
// of the old slot followed by an insert of the new key, possibly reviving
// a tombstone. Emits a single count row.

use std::sync::Arc;

use crate::catalog::{IndexInfo, Schema, TableInfo};
use crate::common::types::Rid;
use crate::execution::common::{apply_mvcc_mutation, ensure_running};
use crate::execution::error::{ExecResult, ExecutionError};
use crate::execution::executor::{Executor, ExecutorContext};
use crate::execution::expression::Expression;
use crate::storage::table::{DataValue, Tuple, TupleMeta};

pub struct UpdateExecutor {
    ctx: Arc<ExecutorContext>,
    table: Arc<TableInfo>,
    indexes: Vec<Arc<IndexInfo>>,
    primary_index: Option<Arc<IndexInfo>>,
    target_exprs: Vec<Expression>,
    child: Box<dyn Executor>,
    output: Schema,
    done: bool,
}

impl UpdateExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        table: Arc<TableInfo>,
        indexes: Vec<Arc<IndexInfo>>,
        target_exprs: Vec<Expression>,
        child: Box<dyn Executor>,
        output: Schema,
    ) -> Self {
        let primary_index = indexes.iter().find(|i| i.is_primary).cloned();
        Self {
            ctx,
            table,
            indexes,
            primary_index,
            target_exprs,
            child,
            output,
            done: false,
        }
    }

    fn insert_fresh(&self, tuple: &Tuple) -> ExecResult<Rid> {
        let txn = &self.ctx.txn;
        let rid = self
            .table
            .heap
            .insert_tuple(TupleMeta::new(txn.temp_ts(), false), tuple)?;
        for index in &self.indexes {
            let key = index.key_from_tuple(tuple);
            if !index.index.insert(&key, &rid)? {
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

    /// Key-changing path: tombstone the old slot, then place the new row
    /// under its new key.
    fn move_row(&self, pk: &IndexInfo, old_rid: Rid, new_tuple: &Tuple) -> ExecResult<()> {
        apply_mvcc_mutation(&self.ctx, &self.table, old_rid, None)?;

        let new_key = pk.key_from_tuple(new_tuple);
        match pk.index.get(&new_key)? {
            Some(existing) => {
                let meta = self.table.heap.get_tuple_meta(existing)?;
                if !meta.is_deleted {
                    self.ctx.txn.set_tainted();
                    return Err(ExecutionError::KeyAlreadyExists);
                }
                apply_mvcc_mutation(&self.ctx, &self.table, existing, Some(new_tuple))?;
            }
            None => {
                self.insert_fresh(new_tuple)?;
            }
        }
        Ok(())
    }
}

impl Executor for UpdateExecutor {
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
        while let Some((old_tuple, rid)) = self.child.next()? {
            let values = self
                .target_exprs
                .iter()
                .map(|e| e.evaluate(&old_tuple))
                .collect::<ExecResult<Vec<_>>>()?;
            let new_tuple = Tuple::new(values);

            match &self.primary_index {
                Some(pk) if pk.key_from_tuple(&old_tuple) != pk.key_from_tuple(&new_tuple) => {
                    self.move_row(pk, rid, &new_tuple)?
                }
                _ => apply_mvcc_mutation(&self.ctx, &self.table, rid, Some(&new_tuple))?,
            }
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

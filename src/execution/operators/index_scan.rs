// Index Scan Operator
//
// Point lookup: probes the hash index with the equality key from the
// plan, resolves the single RID through read visibility, and applies the
// residual filter the optimizer kept for correctness.

use std::sync::Arc;

use crate::catalog::{IndexInfo, Schema, TableInfo};
use crate::common::types::Rid;
use crate::execution::common::visible_tuple;
use crate::execution::error::ExecResult;
use crate::execution::executor::{Executor, ExecutorContext};
use crate::execution::expression::{truthy, Expression};
use crate::storage::table::{DataValue, Tuple};

pub struct IndexScanExecutor {
    ctx: Arc<ExecutorContext>,
    table: Arc<TableInfo>,
    index: Arc<IndexInfo>,
    pred_key: DataValue,
    filter: Option<Expression>,
    output: Schema,
    done: bool,
}

impl IndexScanExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        table: Arc<TableInfo>,
        index: Arc<IndexInfo>,
        pred_key: DataValue,
        filter: Option<Expression>,
        output: Schema,
    ) -> Self {
        Self {
            ctx,
            table,
            index,
            pred_key,
            filter,
            output,
            done: false,
        }
    }
}

impl Executor for IndexScanExecutor {
    fn init(&mut self) -> ExecResult<()> {
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let key = vec![self.pred_key.clone()];
        let Some(rid) = self.index.index.get(&key)? else {
            return Ok(None);
        };
        let (meta, tuple) = self.table.heap.get_tuple(rid)?;
        let Some(visible) = visible_tuple(&self.ctx.txn_mgr, &self.ctx.txn, &meta, &tuple, rid)
        else {
            return Ok(None);
        };
        if let Some(filter) = &self.filter {
            if !truthy(&filter.evaluate(&visible)?) {
                return Ok(None);
            }
        }
        Ok(Some((visible, rid)))
    }

    fn output_schema(&self) -> &Schema {
        &self.output
    }
}

// Sequential Scan Operator
//
// Walks the table heap and resolves each slot through the MVCC read
// visibility rule before applying the optional filter predicate.

use std::sync::Arc;

use crate::catalog::{Schema, TableInfo};
use crate::common::types::Rid;
use crate::execution::common::visible_tuple;
use crate::execution::error::{ExecResult, ExecutionError};
use crate::execution::executor::{Executor, ExecutorContext};
use crate::execution::expression::{truthy, Expression};
use crate::storage::table::{TableIterator, Tuple};

pub struct SeqScanExecutor {
    ctx: Arc<ExecutorContext>,
    table: Arc<TableInfo>,
    filter: Option<Expression>,
    output: Schema,
    iter: Option<TableIterator>,
}

impl SeqScanExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        table: Arc<TableInfo>,
        filter: Option<Expression>,
        output: Schema,
    ) -> Self {
        Self {
            ctx,
            table,
            filter,
            output,
            iter: None,
        }
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> ExecResult<()> {
        self.iter = Some(self.table.heap.iter());
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        let iter = self
            .iter
            .as_mut()
            .ok_or(ExecutionError::NotImplemented("seq scan used before init"))?;
        for (rid, meta, tuple) in iter.by_ref() {
            let Some(visible) =
                visible_tuple(&self.ctx.txn_mgr, &self.ctx.txn, &meta, &tuple, rid)
            else {
                continue;
            };
            if let Some(filter) = &self.filter {
                if !truthy(&filter.evaluate(&visible)?) {
                    continue;
                }
            }
            return Ok(Some((visible, rid)));
        }
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        &self.output
    }
}

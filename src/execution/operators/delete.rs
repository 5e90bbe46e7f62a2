// Delete Operator
//
// Drains its child and tombstones every produced RID through the MVCC
// write protocol. Emits a single count row. Index entries stay in place;
// they resolve to tombstones until garbage collection of the slot.

use std::sync::Arc;

use crate::catalog::{Schema, TableInfo};
use crate::common::types::Rid;
use crate::execution::common::{apply_mvcc_mutation, ensure_running};
use crate::execution::error::ExecResult;
use crate::execution::executor::{Executor, ExecutorContext};
use crate::storage::table::{DataValue, Tuple};

pub struct DeleteExecutor {
    ctx: Arc<ExecutorContext>,
    table: Arc<TableInfo>,
    child: Box<dyn Executor>,
    output: Schema,
    done: bool,
}

impl DeleteExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        table: Arc<TableInfo>,
        child: Box<dyn Executor>,
        output: Schema,
    ) -> Self {
        Self {
            ctx,
            table,
            child,
            output,
            done: false,
        }
    }
}

impl Executor for DeleteExecutor {
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
        while let Some((_, rid)) = self.child.next()? {
            apply_mvcc_mutation(&self.ctx, &self.table, rid, None)?;
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

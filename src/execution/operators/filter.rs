// Filter Operator

use crate::catalog::Schema;
use crate::common::types::Rid;
use crate::execution::error::ExecResult;
use crate::execution::executor::Executor;
use crate::execution::expression::{truthy, Expression};
use crate::storage::table::Tuple;

pub struct FilterExecutor {
    child: Box<dyn Executor>,
    predicate: Expression,
}

impl FilterExecutor {
    pub fn new(child: Box<dyn Executor>, predicate: Expression) -> Self {
        Self { child, predicate }
    }
}

impl Executor for FilterExecutor {
    fn init(&mut self) -> ExecResult<()> {
        self.child.init()
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        while let Some((tuple, rid)) = self.child.next()? {
            if truthy(&self.predicate.evaluate(&tuple)?) {
                return Ok(Some((tuple, rid)));
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        self.child.output_schema()
    }
}

// Projection Operator

use crate::catalog::Schema;
use crate::common::types::Rid;
use crate::execution::error::ExecResult;
use crate::execution::executor::Executor;
use crate::execution::expression::Expression;
use crate::storage::table::Tuple;

pub struct ProjectionExecutor {
    child: Box<dyn Executor>,
    exprs: Vec<Expression>,
    output: Schema,
}

impl ProjectionExecutor {
    pub fn new(child: Box<dyn Executor>, exprs: Vec<Expression>, output: Schema) -> Self {
        Self {
            child,
            exprs,
            output,
        }
    }
}

impl Executor for ProjectionExecutor {
    fn init(&mut self) -> ExecResult<()> {
        self.child.init()
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        match self.child.next()? {
            Some((tuple, rid)) => {
                let values = self
                    .exprs
                    .iter()
                    .map(|e| e.evaluate(&tuple))
                    .collect::<ExecResult<Vec<_>>>()?;
                Ok(Some((Tuple::new(values), rid)))
            }
            None => Ok(None),
        }
    }

    fn output_schema(&self) -> &Schema {
        &self.output
    }
}

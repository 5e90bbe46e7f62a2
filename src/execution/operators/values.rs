// Values Operator
//
// Emits a constant row list; the canonical child of an insert plan.

use crate::catalog::Schema;
use crate::common::types::Rid;
use crate::execution::error::ExecResult;
use crate::execution::executor::Executor;
use crate::execution::expression::Expression;
use crate::storage::table::Tuple;

pub struct ValuesExecutor {
    rows: Vec<Vec<Expression>>,
    output: Schema,
    cursor: usize,
}

impl ValuesExecutor {
    pub fn new(rows: Vec<Vec<Expression>>, output: Schema) -> Self {
        Self {
            rows,
            output,
            cursor: 0,
        }
    }
}

impl Executor for ValuesExecutor {
    fn init(&mut self) -> ExecResult<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        if self.cursor >= self.rows.len() {
            return Ok(None);
        }
        let exprs = &self.rows[self.cursor];
        self.cursor += 1;

        let empty = Tuple::default();
        let values = exprs
            .iter()
            .map(|e| e.evaluate(&empty))
            .collect::<ExecResult<Vec<_>>>()?;
        Ok(Some((Tuple::new(values), Rid::default())))
    }

    fn output_schema(&self) -> &Schema {
        &self.output
    }
}

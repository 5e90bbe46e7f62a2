// Nested Loop Join Operator
//
// INNER and LEFT joins. The outer loop pulls from the left child; for
// each left row the right child is re-initialized and rescanned. A LEFT
// join emits a null-padded row for a left tuple with no match.

use crate::catalog::Schema;
use crate::common::types::Rid;
use crate::execution::error::ExecResult;
use crate::execution::executor::Executor;
use crate::execution::expression::{truthy, Expression};
use crate::execution::plan::JoinType;
use crate::storage::table::{DataValue, Tuple};

pub struct NestedLoopJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    predicate: Option<Expression>,
    join_type: JoinType,
    output: Schema,
    right_width: usize,
    current_left: Option<Tuple>,
    left_matched: bool,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        predicate: Option<Expression>,
        join_type: JoinType,
        output: Schema,
    ) -> Self {
        let right_width = right.output_schema().column_count();
        Self {
            left,
            right,
            predicate,
            join_type,
            output,
            right_width,
            current_left: None,
            left_matched: false,
        }
    }
}

pub(crate) fn join_tuples(left: &Tuple, right: &Tuple) -> Tuple {
    let mut values = left.values().to_vec();
    values.extend(right.values().iter().cloned());
    Tuple::new(values)
}

pub(crate) fn pad_right_nulls(left: &Tuple, right_width: usize) -> Tuple {
    let mut values = left.values().to_vec();
    values.extend(std::iter::repeat(DataValue::Null).take(right_width));
    Tuple::new(values)
}

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> ExecResult<()> {
        self.left.init()?;
        self.right.init()?;
        self.current_left = None;
        self.left_matched = false;
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        loop {
            if self.current_left.is_none() {
                match self.left.next()? {
                    Some((tuple, _)) => {
                        self.current_left = Some(tuple);
                        self.left_matched = false;
                        self.right.init()?;
                    }
                    None => return Ok(None),
                }
            }
            let left_tuple = self
                .current_left
                .clone()
                .expect("left tuple set just above");

            match self.right.next()? {
                Some((right_tuple, _)) => {
                    let matches = match &self.predicate {
                        Some(p) => truthy(&p.evaluate_join(&left_tuple, &right_tuple)?),
                        None => true,
                    };
                    if matches {
                        self.left_matched = true;
                        return Ok(Some((
                            join_tuples(&left_tuple, &right_tuple),
                            Rid::default(),
                        )));
                    }
                }
                None => {
                    let emit_padded =
                        self.join_type == JoinType::Left && !self.left_matched;
                    self.current_left = None;
                    if emit_padded {
                        return Ok(Some((
                            pad_right_nulls(&left_tuple, self.right_width),
                            Rid::default(),
                        )));
                    }
                }
            }
        }
    }

    fn output_schema(&self) -> &Schema {
        &self.output
    }
}

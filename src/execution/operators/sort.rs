// Sort Operator
//
// Materializes the child output, orders it by the configured key list,
// and streams the result.

use std::cmp::Ordering;

use crate::catalog::Schema;
use crate::common::types::Rid;
use crate::execution::error::ExecResult;
use crate::execution::executor::Executor;
use crate::execution::expression::Expression;
use crate::execution::plan::OrderDirection;
use crate::storage::table::{DataValue, Tuple};

/// Compare two precomputed key vectors under the given directions.
pub(crate) fn compare_keys(
    a: &[DataValue],
    b: &[DataValue],
    order_by: &[OrderDirection],
) -> Ordering {
    for ((va, vb), dir) in a.iter().zip(b.iter()).zip(order_by.iter()) {
        let ord = va.total_cmp(vb);
        let ord = match dir {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

pub struct SortExecutor {
    child: Box<dyn Executor>,
    order_by: Vec<(OrderDirection, Expression)>,
    sorted: Option<std::vec::IntoIter<(Tuple, Rid)>>,
}

impl SortExecutor {
    pub fn new(child: Box<dyn Executor>, order_by: Vec<(OrderDirection, Expression)>) -> Self {
        Self {
            child,
            order_by,
            sorted: None,
        }
    }

    fn materialize(&mut self) -> ExecResult<Vec<(Tuple, Rid)>> {
        let mut rows: Vec<(Vec<DataValue>, Tuple, Rid)> = Vec::new();
        while let Some((tuple, rid)) = self.child.next()? {
            let keys = self
                .order_by
                .iter()
                .map(|(_, e)| e.evaluate(&tuple))
                .collect::<ExecResult<Vec<_>>>()?;
            rows.push((keys, tuple, rid));
        }
        let dirs: Vec<OrderDirection> = self.order_by.iter().map(|(d, _)| *d).collect();
        rows.sort_by(|a, b| compare_keys(&a.0, &b.0, &dirs));
        Ok(rows.into_iter().map(|(_, t, r)| (t, r)).collect())
    }
}

impl Executor for SortExecutor {
    fn init(&mut self) -> ExecResult<()> {
        self.sorted = None;
        self.child.init()
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        if self.sorted.is_none() {
            let rows = self.materialize()?;
            self.sorted = Some(rows.into_iter());
        }
        Ok(self.sorted.as_mut().and_then(|iter| iter.next()))
    }

    fn output_schema(&self) -> &Schema {
        self.child.output_schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType};
    use crate::execution::operators::test_support::MockExecutor;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("a", DataType::Integer),
            Column::new("b", DataType::Integer),
        ])
    }

    fn row(a: i64, b: i64) -> Tuple {
        Tuple::new(vec![DataValue::Integer(a), DataValue::Integer(b)])
    }

    #[test]
    fn test_two_key_sort() {
        let child = Box::new(MockExecutor::new(
            vec![row(1, 9), row(2, 1), row(1, 3), row(2, 0)],
            schema(),
        ));
        let mut exec = SortExecutor::new(
            child,
            vec![
                (OrderDirection::Desc, Expression::column(0)),
                (OrderDirection::Asc, Expression::column(1)),
            ],
        );
        exec.init().unwrap();

        let mut out = Vec::new();
        while let Some((tuple, _)) = exec.next().unwrap() {
            out.push((tuple.value(0).clone(), tuple.value(1).clone()));
        }
        assert_eq!(
            out,
            vec![
                (DataValue::Integer(2), DataValue::Integer(0)),
                (DataValue::Integer(2), DataValue::Integer(1)),
                (DataValue::Integer(1), DataValue::Integer(3)),
                (DataValue::Integer(1), DataValue::Integer(9)),
            ]
        );
    }

    #[test]
    fn test_reinit_resorts() {
        let child = Box::new(MockExecutor::new(vec![row(2, 0), row(1, 0)], schema()));
        let mut exec = SortExecutor::new(
            child,
            vec![(OrderDirection::Asc, Expression::column(0))],
        );
        exec.init().unwrap();
        assert_eq!(
            exec.next().unwrap().unwrap().0.value(0),
            &DataValue::Integer(1)
        );
        exec.init().unwrap();
        assert_eq!(
            exec.next().unwrap().unwrap().0.value(0),
            &DataValue::Integer(1)
        );
    }
}

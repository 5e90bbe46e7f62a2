// Window Function Operator
//
// Materializes the child, optionally sorts by the window order-by, and
// computes per-partition accumulator state for every window column. With
// an order-by the aggregates are running values and rank assigns equal
// rows equal ranks; without one, every row sees its partition's final
// value.

use std::collections::HashMap;

use crate::catalog::Schema;
use crate::common::types::Rid;
use crate::execution::error::{ExecResult, ExecutionError};
use crate::execution::executor::Executor;
use crate::execution::operators::aggregation::{combine, initial_value};
use crate::execution::operators::sort::compare_keys;
use crate::execution::plan::{
    AggregationType, OrderDirection, WindowColumn, WindowFunction, WindowFunctionType,
};
use crate::storage::table::{DataValue, Tuple};

fn aggregation_type(ty: WindowFunctionType) -> Option<AggregationType> {
    match ty {
        WindowFunctionType::CountStar => Some(AggregationType::CountStar),
        WindowFunctionType::Count => Some(AggregationType::Count),
        WindowFunctionType::Sum => Some(AggregationType::Sum),
        WindowFunctionType::Min => Some(AggregationType::Min),
        WindowFunctionType::Max => Some(AggregationType::Max),
        WindowFunctionType::Rank => None,
    }
}

pub struct WindowExecutor {
    child: Box<dyn Executor>,
    columns: Vec<WindowColumn>,
    output: Schema,
    results: Option<std::vec::IntoIter<Tuple>>,
}

impl WindowExecutor {
    pub fn new(child: Box<dyn Executor>, columns: Vec<WindowColumn>, output: Schema) -> Self {
        Self {
            child,
            columns,
            output,
            results: None,
        }
    }

    fn partition_key(f: &WindowFunction, row: &Tuple) -> ExecResult<Vec<DataValue>> {
        f.partition_by.iter().map(|e| e.evaluate(row)).collect()
    }

    fn build(&mut self) -> ExecResult<Vec<Tuple>> {
        let mut rows: Vec<Tuple> = Vec::new();
        while let Some((tuple, _)) = self.child.next()? {
            rows.push(tuple);
        }

        // The planner hands every windowed column the same order-by; the
        // first one found drives the sort.
        let order_by: Option<Vec<(OrderDirection, crate::execution::expression::Expression)>> =
            self.columns.iter().find_map(|c| match c {
                WindowColumn::Function(f) if !f.order_by.is_empty() => Some(f.order_by.clone()),
                _ => None,
            });

        if let Some(order_by) = &order_by {
            let dirs: Vec<OrderDirection> = order_by.iter().map(|(d, _)| *d).collect();
            let mut keyed: Vec<(Vec<DataValue>, Tuple)> = rows
                .into_iter()
                .map(|t| {
                    let keys = order_by
                        .iter()
                        .map(|(_, e)| e.evaluate(&t))
                        .collect::<ExecResult<Vec<_>>>()?;
                    Ok((keys, t))
                })
                .collect::<ExecResult<Vec<_>>>()?;
            keyed.sort_by(|a, b| compare_keys(&a.0, &b.0, &dirs));
            rows = keyed.into_iter().map(|(_, t)| t).collect();
        }

        let mut maps: Vec<HashMap<Vec<DataValue>, DataValue>> =
            self.columns.iter().map(|_| HashMap::new()).collect();

        if order_by.is_some() {
            self.build_running(&rows, &mut maps)
        } else {
            self.build_final(&rows, &mut maps)
        }
    }

    /// Running semantics: each row observes the accumulator state right
    /// after folding itself in; rank gives equal order keys equal ranks.
    fn build_running(
        &self,
        rows: &[Tuple],
        maps: &mut [HashMap<Vec<DataValue>, DataValue>],
    ) -> ExecResult<Vec<Tuple>> {
        let mut rank_state: Vec<Option<(Vec<DataValue>, i64)>> =
            self.columns.iter().map(|_| None).collect();
        let mut out = Vec::with_capacity(rows.len());

        for row in rows {
            let mut values = Vec::with_capacity(self.columns.len());
            for (ci, column) in self.columns.iter().enumerate() {
                match column {
                    WindowColumn::Plain(e) => values.push(e.evaluate(row)?),
                    WindowColumn::Function(f) => {
                        let key = Self::partition_key(f, row)?;
                        match aggregation_type(f.ty) {
                            Some(agg_ty) => {
                                let acc = maps[ci]
                                    .entry(key)
                                    .or_insert_with(|| initial_value(agg_ty));
                                let input = match &f.arg {
                                    Some(e) => e.evaluate(row)?,
                                    None => DataValue::Integer(1),
                                };
                                combine(acc, &input, agg_ty)?;
                                values.push(acc.clone());
                            }
                            None => {
                                // Rank: rows equal under the order-by share
                                // a rank; the counter still advances.
                                let acc = maps[ci]
                                    .entry(key)
                                    .or_insert(DataValue::Integer(0));
                                let position = match acc {
                                    DataValue::Integer(n) => {
                                        *n += 1;
                                        *n
                                    }
                                    _ => 0,
                                };
                                let order_vals = f
                                    .order_by
                                    .iter()
                                    .map(|(_, e)| e.evaluate(row))
                                    .collect::<ExecResult<Vec<_>>>()?;
                                let rank = match &rank_state[ci] {
                                    Some((last_vals, last_rank)) if *last_vals == order_vals => {
                                        *last_rank
                                    }
                                    _ => position,
                                };
                                rank_state[ci] = Some((order_vals, rank));
                                values.push(DataValue::Integer(rank));
                            }
                        }
                    }
                }
            }
            out.push(Tuple::new(values));
        }
        Ok(out)
    }

    /// Whole-partition semantics: fold everything first, then emit each
    /// partition's final value for every member row.
    fn build_final(
        &self,
        rows: &[Tuple],
        maps: &mut [HashMap<Vec<DataValue>, DataValue>],
    ) -> ExecResult<Vec<Tuple>> {
        for row in rows {
            for (ci, column) in self.columns.iter().enumerate() {
                if let WindowColumn::Function(f) = column {
                    let Some(agg_ty) = aggregation_type(f.ty) else {
                        return Err(ExecutionError::NotImplemented(
                            "rank requires an order-by clause",
                        ));
                    };
                    let key = Self::partition_key(f, row)?;
                    let acc = maps[ci].entry(key).or_insert_with(|| initial_value(agg_ty));
                    let input = match &f.arg {
                        Some(e) => e.evaluate(row)?,
                        None => DataValue::Integer(1),
                    };
                    combine(acc, &input, agg_ty)?;
                }
            }
        }

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(self.columns.len());
            for (ci, column) in self.columns.iter().enumerate() {
                match column {
                    WindowColumn::Plain(e) => values.push(e.evaluate(row)?),
                    WindowColumn::Function(f) => {
                        let key = Self::partition_key(f, row)?;
                        values.push(maps[ci].get(&key).cloned().unwrap_or(DataValue::Null));
                    }
                }
            }
            out.push(Tuple::new(values));
        }
        Ok(out)
    }
}

impl Executor for WindowExecutor {
    fn init(&mut self) -> ExecResult<()> {
        self.results = None;
        self.child.init()
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        if self.results.is_none() {
            let rows = self.build()?;
            self.results = Some(rows.into_iter());
        }
        Ok(self
            .results
            .as_mut()
            .and_then(|iter| iter.next())
            .map(|t| (t, Rid::default())))
    }

    fn output_schema(&self) -> &Schema {
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType};
    use crate::execution::expression::Expression;
    use crate::execution::operators::test_support::MockExecutor;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("grp", DataType::Integer),
            Column::new("v", DataType::Integer),
        ])
    }

    fn row(g: i64, v: i64) -> Tuple {
        Tuple::new(vec![DataValue::Integer(g), DataValue::Integer(v)])
    }

    #[test]
    fn test_partitioned_sum_without_order_by() {
        let child = Box::new(MockExecutor::new(
            vec![row(1, 10), row(2, 5), row(1, 20)],
            schema(),
        ));
        let columns = vec![
            WindowColumn::Plain(Expression::column(0)),
            WindowColumn::Function(WindowFunction {
                ty: WindowFunctionType::Sum,
                arg: Some(Expression::column(1)),
                partition_by: vec![Expression::column(0)],
                order_by: vec![],
            }),
        ];
        let mut exec = WindowExecutor::new(child, columns, Schema::default());
        exec.init().unwrap();

        let mut out = Vec::new();
        while let Some((t, _)) = exec.next().unwrap() {
            out.push((t.value(0).clone(), t.value(1).clone()));
        }
        // Every member of partition 1 sees the final sum 30.
        assert_eq!(
            out,
            vec![
                (DataValue::Integer(1), DataValue::Integer(30)),
                (DataValue::Integer(2), DataValue::Integer(5)),
                (DataValue::Integer(1), DataValue::Integer(30)),
            ]
        );
    }

    #[test]
    fn test_running_count_with_order_by() {
        let child = Box::new(MockExecutor::new(
            vec![row(0, 3), row(0, 1), row(0, 2)],
            schema(),
        ));
        let columns = vec![
            WindowColumn::Plain(Expression::column(1)),
            WindowColumn::Function(WindowFunction {
                ty: WindowFunctionType::CountStar,
                arg: None,
                partition_by: vec![],
                order_by: vec![(OrderDirection::Asc, Expression::column(1))],
            }),
        ];
        let mut exec = WindowExecutor::new(child, columns, Schema::default());
        exec.init().unwrap();

        let mut out = Vec::new();
        while let Some((t, _)) = exec.next().unwrap() {
            out.push((t.value(0).clone(), t.value(1).clone()));
        }
        assert_eq!(
            out,
            vec![
                (DataValue::Integer(1), DataValue::Integer(1)),
                (DataValue::Integer(2), DataValue::Integer(2)),
                (DataValue::Integer(3), DataValue::Integer(3)),
            ]
        );
    }

    #[test]
    fn test_rank_assigns_ties_equal_ranks() {
        let child = Box::new(MockExecutor::new(
            vec![row(0, 10), row(0, 20), row(0, 10), row(0, 30)],
            schema(),
        ));
        let columns = vec![
            WindowColumn::Plain(Expression::column(1)),
            WindowColumn::Function(WindowFunction {
                ty: WindowFunctionType::Rank,
                arg: None,
                partition_by: vec![],
                order_by: vec![(OrderDirection::Asc, Expression::column(1))],
            }),
        ];
        let mut exec = WindowExecutor::new(child, columns, Schema::default());
        exec.init().unwrap();

        let mut out = Vec::new();
        while let Some((t, _)) = exec.next().unwrap() {
            out.push((t.value(0).clone(), t.value(1).clone()));
        }
        // 10, 10 share rank 1; 20 ranks 3; 30 ranks 4.
        assert_eq!(
            out,
            vec![
                (DataValue::Integer(10), DataValue::Integer(1)),
                (DataValue::Integer(10), DataValue::Integer(1)),
                (DataValue::Integer(20), DataValue::Integer(3)),
                (DataValue::Integer(30), DataValue::Integer(4)),
            ]
        );
    }
}

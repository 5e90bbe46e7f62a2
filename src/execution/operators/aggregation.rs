// Aggregation Operator
//
// Hash aggregation: group-by keys map to one accumulator per aggregate
// expression. NULL inputs never feed an accumulator; count(*) counts
// rows. With no input and no group-by, exactly one row of identities
// (0 for counts, NULL for the rest) comes out.

use std::collections::HashMap;

use crate::catalog::Schema;
use crate::common::types::Rid;
use crate::execution::error::{ExecResult, ExecutionError};
use crate::execution::executor::Executor;
use crate::execution::expression::Expression;
use crate::execution::plan::{AggregateExpr, AggregationType};
use crate::storage::table::{DataValue, Tuple};

/// Identity value of an aggregate.
pub fn initial_value(ty: AggregationType) -> DataValue {
    match ty {
        AggregationType::CountStar => DataValue::Integer(0),
        _ => DataValue::Null,
    }
}

/// Fold one input into an accumulator.
pub fn combine(acc: &mut DataValue, input: &DataValue, ty: AggregationType) -> ExecResult<()> {
    match ty {
        AggregationType::CountStar => {
            if let DataValue::Integer(n) = acc {
                *n += 1;
            }
        }
        AggregationType::Count => {
            if !input.is_null() {
                match acc {
                    DataValue::Integer(n) => *n += 1,
                    DataValue::Null => *acc = DataValue::Integer(1),
                    _ => {}
                }
            }
        }
        AggregationType::Sum => {
            if !input.is_null() {
                *acc = match (&*acc, input) {
                    (DataValue::Null, v) => v.clone(),
                    (DataValue::Integer(a), DataValue::Integer(b)) => DataValue::Integer(a + b),
                    (DataValue::Float(a), DataValue::Float(b)) => DataValue::Float(a + b),
                    (DataValue::Integer(a), DataValue::Float(b)) => {
                        DataValue::Float(*a as f64 + b)
                    }
                    (DataValue::Float(a), DataValue::Integer(b)) => {
                        DataValue::Float(a + *b as f64)
                    }
                    (a, b) => {
                        return Err(ExecutionError::Expression(format!(
                            "cannot sum {} and {}",
                            a, b
                        )))
                    }
                };
            }
        }
        AggregationType::Min => {
            if !input.is_null() {
                let replace = match &*acc {
                    DataValue::Null => true,
                    current => matches!(
                        input.partial_cmp(current),
                        Some(std::cmp::Ordering::Less)
                    ),
                };
                if replace {
                    *acc = input.clone();
                }
            }
        }
        AggregationType::Max => {
            if !input.is_null() {
                let replace = match &*acc {
                    DataValue::Null => true,
                    current => matches!(
                        input.partial_cmp(current),
                        Some(std::cmp::Ordering::Greater)
                    ),
                };
                if replace {
                    *acc = input.clone();
                }
            }
        }
    }
    Ok(())
}

pub struct AggregationExecutor {
    child: Box<dyn Executor>,
    group_by: Vec<Expression>,
    aggregates: Vec<AggregateExpr>,
    output: Schema,
    results: Option<std::vec::IntoIter<Tuple>>,
}

impl AggregationExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        group_by: Vec<Expression>,
        aggregates: Vec<AggregateExpr>,
        output: Schema,
    ) -> Self {
        Self {
            child,
            group_by,
            aggregates,
            output,
            results: None,
        }
    }

    fn build(&mut self) -> ExecResult<Vec<Tuple>> {
        let mut groups: HashMap<Vec<DataValue>, Vec<DataValue>> = HashMap::new();

        while let Some((tuple, _)) = self.child.next()? {
            let key = self
                .group_by
                .iter()
                .map(|e| e.evaluate(&tuple))
                .collect::<ExecResult<Vec<_>>>()?;
            let accs = groups.entry(key).or_insert_with(|| {
                self.aggregates.iter().map(|a| initial_value(a.ty)).collect()
            });
            for (i, agg) in self.aggregates.iter().enumerate() {
                let input = match &agg.arg {
                    Some(e) => e.evaluate(&tuple)?,
                    None => DataValue::Integer(1),
                };
                combine(&mut accs[i], &input, agg.ty)?;
            }
        }

        if groups.is_empty() && self.group_by.is_empty() {
            groups.insert(
                Vec::new(),
                self.aggregates.iter().map(|a| initial_value(a.ty)).collect(),
            );
        }

        Ok(groups
            .into_iter()
            .map(|(mut key, accs)| {
                key.extend(accs);
                Tuple::new(key)
            })
            .collect())
    }
}

impl Executor for AggregationExecutor {
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

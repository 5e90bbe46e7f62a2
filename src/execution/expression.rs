// Expression Trees
//
// Predicates and projections arrive from the external planner as
// index-addressed trees: a column reference names a tuple side (0 = left,
// 1 = right for join predicates) and a column position, never a name.

use std::cmp::Ordering;

use crate::execution::error::{ExecResult, ExecutionError};
use crate::storage::table::{DataValue, Tuple};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    ColumnRef {
        /// 0 = the (left) tuple, 1 = the right tuple of a join pair
        tuple_idx: usize,
        col_idx: usize,
    },
    Constant(DataValue),
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logic {
        op: LogicOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn column(col_idx: usize) -> Self {
        Expression::ColumnRef {
            tuple_idx: 0,
            col_idx,
        }
    }

    pub fn column_of(tuple_idx: usize, col_idx: usize) -> Self {
        Expression::ColumnRef { tuple_idx, col_idx }
    }

    pub fn constant(value: DataValue) -> Self {
        Expression::Constant(value)
    }

    pub fn comparison(op: ComparisonOp, left: Expression, right: Expression) -> Self {
        Expression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::Logic {
            op: LogicOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Evaluate against a single tuple.
    pub fn evaluate(&self, tuple: &Tuple) -> ExecResult<DataValue> {
        self.eval(tuple, None)
    }

    /// Evaluate against a join pair; column refs pick their side by
    /// tuple_idx.
    pub fn evaluate_join(&self, left: &Tuple, right: &Tuple) -> ExecResult<DataValue> {
        self.eval(left, Some(right))
    }

    fn eval(&self, left: &Tuple, right: Option<&Tuple>) -> ExecResult<DataValue> {
        match self {
            Expression::ColumnRef { tuple_idx, col_idx } => {
                let tuple = match (tuple_idx, right) {
                    (0, _) => left,
                    (1, Some(r)) => r,
                    _ => {
                        return Err(ExecutionError::Expression(format!(
                            "column reference to tuple {} outside a join",
                            tuple_idx
                        )))
                    }
                };
                if *col_idx >= tuple.len() {
                    return Err(ExecutionError::Expression(format!(
                        "column {} out of range for a {}-column tuple",
                        col_idx,
                        tuple.len()
                    )));
                }
                Ok(tuple.value(*col_idx).clone())
            }
            Expression::Constant(value) => Ok(value.clone()),
            Expression::Comparison { op, left: l, right: r } => {
                let lv = l.eval(left, right)?;
                let rv = r.eval(left, right)?;
                if lv.is_null() || rv.is_null() {
                    return Ok(DataValue::Null);
                }
                let ord = lv.partial_cmp(&rv).ok_or_else(|| {
                    ExecutionError::Expression(format!("cannot compare {} with {}", lv, rv))
                })?;
                let result = match op {
                    ComparisonOp::Eq => ord == Ordering::Equal,
                    ComparisonOp::NotEq => ord != Ordering::Equal,
                    ComparisonOp::Lt => ord == Ordering::Less,
                    ComparisonOp::LtEq => ord != Ordering::Greater,
                    ComparisonOp::Gt => ord == Ordering::Greater,
                    ComparisonOp::GtEq => ord != Ordering::Less,
                };
                Ok(DataValue::Boolean(result))
            }
            Expression::Logic { op, left: l, right: r } => {
                let lv = truthy(&l.eval(left, right)?);
                let rv = truthy(&r.eval(left, right)?);
                let result = match op {
                    LogicOp::And => lv && rv,
                    LogicOp::Or => lv || rv,
                };
                Ok(DataValue::Boolean(result))
            }
            Expression::Arithmetic { op, left: l, right: r } => {
                let lv = l.eval(left, right)?;
                let rv = r.eval(left, right)?;
                if lv.is_null() || rv.is_null() {
                    return Ok(DataValue::Null);
                }
                match (op, &lv, &rv) {
                    (ArithmeticOp::Add, DataValue::Integer(a), DataValue::Integer(b)) => {
                        Ok(DataValue::Integer(a + b))
                    }
                    (ArithmeticOp::Subtract, DataValue::Integer(a), DataValue::Integer(b)) => {
                        Ok(DataValue::Integer(a - b))
                    }
                    (ArithmeticOp::Add, DataValue::Float(a), DataValue::Float(b)) => {
                        Ok(DataValue::Float(a + b))
                    }
                    (ArithmeticOp::Subtract, DataValue::Float(a), DataValue::Float(b)) => {
                        Ok(DataValue::Float(a - b))
                    }
                    _ => Err(ExecutionError::Expression(format!(
                        "arithmetic on incompatible values {} and {}",
                        lv, rv
                    ))),
                }
            }
        }
    }
}

/// SQL-ish truthiness for predicates: only a true boolean passes.
pub fn truthy(value: &DataValue) -> bool {
    matches!(value, DataValue::Boolean(true))
}

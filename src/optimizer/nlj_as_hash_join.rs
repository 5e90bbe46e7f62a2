// NLJ -> Hash Join Rewrite
//
// A nested-loop join qualifies when its predicate is a conjunction of
// column-to-column equalities across the two sides. Any other conjunct
// blocks the rewrite. Key expressions are normalized so the left key list
// always refers to the left child.

use crate::execution::expression::{ComparisonOp, Expression, LogicOp};
use crate::execution::plan::PlanNode;
use crate::optimizer::map_children;

pub struct NljAsHashJoin;

impl NljAsHashJoin {
    pub fn new() -> Self {
        NljAsHashJoin
    }

    pub fn optimize(&self, plan: PlanNode) -> PlanNode {
        let plan = map_children(plan, &|child| self.optimize(child));
        match plan {
            PlanNode::NestedLoopJoin {
                left,
                right,
                predicate: Some(predicate),
                join_type,
                output,
            } => match extract_equi_keys(&predicate) {
                Some((left_keys, right_keys)) => PlanNode::HashJoin {
                    left,
                    right,
                    left_keys,
                    right_keys,
                    join_type,
                    output,
                },
                None => PlanNode::NestedLoopJoin {
                    left,
                    right,
                    predicate: Some(predicate),
                    join_type,
                    output,
                },
            },
            other => other,
        }
    }
}

impl Default for NljAsHashJoin {
    fn default() -> Self {
        Self::new()
    }
}

fn split_conjunction<'a>(expr: &'a Expression, out: &mut Vec<&'a Expression>) {
    match expr {
        Expression::Logic {
            op: LogicOp::And,
            left,
            right,
        } => {
            split_conjunction(left, out);
            split_conjunction(right, out);
        }
        other => out.push(other),
    }
}

/// Left/right probe keys when every conjunct is a cross-side column
/// equality; None otherwise.
fn extract_equi_keys(predicate: &Expression) -> Option<(Vec<Expression>, Vec<Expression>)> {
    let mut conjuncts = Vec::new();
    split_conjunction(predicate, &mut conjuncts);

    let mut left_keys = Vec::new();
    let mut right_keys = Vec::new();
    for conjunct in conjuncts {
        let Expression::Comparison {
            op: ComparisonOp::Eq,
            left,
            right,
        } = conjunct
        else {
            return None;
        };
        match (left.as_ref(), right.as_ref()) {
            (
                Expression::ColumnRef {
                    tuple_idx: 0,
                    col_idx: l,
                },
                Expression::ColumnRef {
                    tuple_idx: 1,
                    col_idx: r,
                },
            ) => {
                left_keys.push(Expression::column(*l));
                right_keys.push(Expression::column(*r));
            }
            (
                Expression::ColumnRef {
                    tuple_idx: 1,
                    col_idx: r,
                },
                Expression::ColumnRef {
                    tuple_idx: 0,
                    col_idx: l,
                },
            ) => {
                left_keys.push(Expression::column(*l));
                right_keys.push(Expression::column(*r));
            }
            _ => return None,
        }
    }
    if left_keys.is_empty() {
        None
    } else {
        Some((left_keys, right_keys))
    }
}

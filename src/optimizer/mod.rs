// Optimizer Rules
//
// Two syntactic rewrites over physical plans, applied bottom-up: a
// nested-loop join whose predicate is a pure conjunction of column
// equalities becomes a hash join, and a sequential scan filtered by a
// single column = constant equality becomes an index point lookup when a
// matching single-column index exists.

pub mod nlj_as_hash_join;
pub mod seq_scan_as_index_scan;

pub use nlj_as_hash_join::NljAsHashJoin;
pub use seq_scan_as_index_scan::SeqScanAsIndexScan;

use crate::execution::plan::PlanNode;

/// Rebuild a plan node with every direct child transformed by `f`.
pub(crate) fn map_children(plan: PlanNode, f: &dyn Fn(PlanNode) -> PlanNode) -> PlanNode {
    match plan {
        leaf @ (PlanNode::SeqScan { .. }
        | PlanNode::IndexScan { .. }
        | PlanNode::Values { .. }) => leaf,
        PlanNode::Filter { predicate, child } => PlanNode::Filter {
            predicate,
            child: Box::new(f(*child)),
        },
        PlanNode::Projection {
            exprs,
            child,
            output,
        } => PlanNode::Projection {
            exprs,
            child: Box::new(f(*child)),
            output,
        },
        PlanNode::Insert {
            table_oid,
            child,
            output,
        } => PlanNode::Insert {
            table_oid,
            child: Box::new(f(*child)),
            output,
        },
        PlanNode::Update {
            table_oid,
            target_exprs,
            child,
            output,
        } => PlanNode::Update {
            table_oid,
            target_exprs,
            child: Box::new(f(*child)),
            output,
        },
        PlanNode::Delete {
            table_oid,
            child,
            output,
        } => PlanNode::Delete {
            table_oid,
            child: Box::new(f(*child)),
            output,
        },
        PlanNode::NestedLoopJoin {
            left,
            right,
            predicate,
            join_type,
            output,
        } => PlanNode::NestedLoopJoin {
            left: Box::new(f(*left)),
            right: Box::new(f(*right)),
            predicate,
            join_type,
            output,
        },
        PlanNode::HashJoin {
            left,
            right,
            left_keys,
            right_keys,
            join_type,
            output,
        } => PlanNode::HashJoin {
            left: Box::new(f(*left)),
            right: Box::new(f(*right)),
            left_keys,
            right_keys,
            join_type,
            output,
        },
        PlanNode::Aggregation {
            child,
            group_by,
            aggregates,
            output,
        } => PlanNode::Aggregation {
            child: Box::new(f(*child)),
            group_by,
            aggregates,
            output,
        },
        PlanNode::Sort { child, order_by } => PlanNode::Sort {
            child: Box::new(f(*child)),
            order_by,
        },
        PlanNode::TopN {
            child,
            order_by,
            n,
        } => PlanNode::TopN {
            child: Box::new(f(*child)),
            order_by,
            n,
        },
        PlanNode::Window {
            child,
            columns,
            output,
        } => PlanNode::Window {
            child: Box::new(f(*child)),
            columns,
            output,
        },
    }
}

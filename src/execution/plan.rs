// Physical Plan Nodes
//
// Plans arrive from the external planner/optimizer as a tree of physical
// operators with all output schemas declared up front. The two rewrites in
// the optimizer module transform these nodes syntactically.

use crate::catalog::Schema;
use crate::common::types::{IndexOid, TableOid};
use crate::execution::expression::Expression;
use crate::storage::table::DataValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationType {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFunctionType {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
    Rank,
}

#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub ty: AggregationType,
    /// None only for CountStar
    pub arg: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct WindowFunction {
    pub ty: WindowFunctionType,
    pub arg: Option<Expression>,
    pub partition_by: Vec<Expression>,
    pub order_by: Vec<(OrderDirection, Expression)>,
}

/// One output column of a window plan: either a passthrough expression or
/// a window function.
#[derive(Debug, Clone)]
pub enum WindowColumn {
    Plain(Expression),
    Function(WindowFunction),
}

#[derive(Debug, Clone)]
pub enum PlanNode {
    SeqScan {
        table_oid: TableOid,
        filter: Option<Expression>,
        output: Schema,
    },
    IndexScan {
        table_oid: TableOid,
        index_oid: IndexOid,
        pred_key: DataValue,
        filter: Option<Expression>,
        output: Schema,
    },
    Values {
        rows: Vec<Vec<Expression>>,
        output: Schema,
    },
    Filter {
        predicate: Expression,
        child: Box<PlanNode>,
    },
    Projection {
        exprs: Vec<Expression>,
        child: Box<PlanNode>,
        output: Schema,
    },
    Insert {
        table_oid: TableOid,
        child: Box<PlanNode>,
        output: Schema,
    },
    Update {
        table_oid: TableOid,
        target_exprs: Vec<Expression>,
        child: Box<PlanNode>,
        output: Schema,
    },
    Delete {
        table_oid: TableOid,
        child: Box<PlanNode>,
        output: Schema,
    },
    NestedLoopJoin {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        predicate: Option<Expression>,
        join_type: JoinType,
        output: Schema,
    },
    HashJoin {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        left_keys: Vec<Expression>,
        right_keys: Vec<Expression>,
        join_type: JoinType,
        output: Schema,
    },
    Aggregation {
        child: Box<PlanNode>,
        group_by: Vec<Expression>,
        aggregates: Vec<AggregateExpr>,
        output: Schema,
    },
    Sort {
        child: Box<PlanNode>,
        order_by: Vec<(OrderDirection, Expression)>,
    },
    TopN {
        child: Box<PlanNode>,
        order_by: Vec<(OrderDirection, Expression)>,
        n: usize,
    },
    Window {
        child: Box<PlanNode>,
        columns: Vec<WindowColumn>,
        output: Schema,
    },
}

impl PlanNode {
    /// DML plans share the single-column count output.
    pub fn insert(table_oid: TableOid, child: PlanNode) -> Self {
        PlanNode::Insert {
            table_oid,
            child: Box::new(child),
            output: Schema::count_schema(),
        }
    }

    pub fn update(table_oid: TableOid, target_exprs: Vec<Expression>, child: PlanNode) -> Self {
        PlanNode::Update {
            table_oid,
            target_exprs,
            child: Box::new(child),
            output: Schema::count_schema(),
        }
    }

    pub fn delete(table_oid: TableOid, child: PlanNode) -> Self {
        PlanNode::Delete {
            table_oid,
            child: Box::new(child),
            output: Schema::count_schema(),
        }
    }

    pub fn output_schema(&self) -> &Schema {
        match self {
            PlanNode::SeqScan { output, .. }
            | PlanNode::IndexScan { output, .. }
            | PlanNode::Values { output, .. }
            | PlanNode::Projection { output, .. }
            | PlanNode::Insert { output, .. }
            | PlanNode::Update { output, .. }
            | PlanNode::Delete { output, .. }
            | PlanNode::NestedLoopJoin { output, .. }
            | PlanNode::HashJoin { output, .. }
            | PlanNode::Aggregation { output, .. }
            | PlanNode::Window { output, .. } => output,
            PlanNode::Filter { child, .. }
            | PlanNode::Sort { child, .. }
            | PlanNode::TopN { child, .. } => child.output_schema(),
        }
    }
}

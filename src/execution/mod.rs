pub mod common;
pub mod error;
pub mod executor;
pub mod expression;
pub mod operators;
pub mod plan;

pub use error::{ExecResult, ExecutionError};
pub use executor::{Executor, ExecutorContext, ExecutorFactory};
pub use expression::{ComparisonOp, Expression, LogicOp};
pub use plan::{
    AggregateExpr, AggregationType, JoinType, OrderDirection, PlanNode, WindowColumn,
    WindowFunction, WindowFunctionType,
};

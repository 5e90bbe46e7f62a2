// Executor Contract & Factory
//
// Volcano-style pull executors: `init` resets state, `next` synchronously
// produces one row or None. Operators own their children; only DML
// executors talk to the transaction manager.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::{Catalog, Schema};
use crate::common::types::Rid;
use crate::execution::error::{ExecResult, ExecutionError};
use crate::execution::operators::aggregation::AggregationExecutor;
use crate::execution::operators::delete::DeleteExecutor;
use crate::execution::operators::filter::FilterExecutor;
use crate::execution::operators::hash_join::HashJoinExecutor;
use crate::execution::operators::index_scan::IndexScanExecutor;
use crate::execution::operators::insert::InsertExecutor;
use crate::execution::operators::nested_loop_join::NestedLoopJoinExecutor;
use crate::execution::operators::projection::ProjectionExecutor;
use crate::execution::operators::seq_scan::SeqScanExecutor;
use crate::execution::operators::sort::SortExecutor;
use crate::execution::operators::topn::TopNExecutor;
use crate::execution::operators::update::UpdateExecutor;
use crate::execution::operators::values::ValuesExecutor;
use crate::execution::operators::window::WindowExecutor;
use crate::execution::plan::PlanNode;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::table::Tuple;
use crate::transaction::{Transaction, TransactionManager};

/// The uniform Init/Next iterator contract.
pub trait Executor: Send {
    fn init(&mut self) -> ExecResult<()>;
    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>>;
    fn output_schema(&self) -> &Schema;
}

/// Everything an executor may touch, threaded through construction.
pub struct ExecutorContext {
    pub txn: Arc<Transaction>,
    pub txn_mgr: Arc<TransactionManager>,
    pub catalog: Arc<RwLock<Catalog>>,
    pub bpm: Arc<BufferPoolManager>,
}

impl ExecutorContext {
    pub fn new(
        txn: Arc<Transaction>,
        txn_mgr: Arc<TransactionManager>,
        catalog: Arc<RwLock<Catalog>>,
        bpm: Arc<BufferPoolManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            txn,
            txn_mgr,
            catalog,
            bpm,
        })
    }
}

pub struct ExecutorFactory;

impl ExecutorFactory {
    /// Build the executor tree for a plan.
    pub fn create_executor(
        ctx: &Arc<ExecutorContext>,
        plan: &PlanNode,
    ) -> ExecResult<Box<dyn Executor>> {
        match plan {
            PlanNode::SeqScan {
                table_oid,
                filter,
                output,
            } => {
                let table = ctx
                    .catalog
                    .read()
                    .table(*table_oid)
                    .ok_or(ExecutionError::TableNotFound(*table_oid))?;
                Ok(Box::new(SeqScanExecutor::new(
                    ctx.clone(),
                    table,
                    filter.clone(),
                    output.clone(),
                )))
            }
            PlanNode::IndexScan {
                table_oid,
                index_oid,
                pred_key,
                filter,
                output,
            } => {
                let catalog = ctx.catalog.read();
                let table = catalog
                    .table(*table_oid)
                    .ok_or(ExecutionError::TableNotFound(*table_oid))?;
                let index = catalog
                    .index(*index_oid)
                    .ok_or(ExecutionError::IndexNotFound(*index_oid))?;
                Ok(Box::new(IndexScanExecutor::new(
                    ctx.clone(),
                    table,
                    index,
                    pred_key.clone(),
                    filter.clone(),
                    output.clone(),
                )))
            }
            PlanNode::Values { rows, output } => {
                Ok(Box::new(ValuesExecutor::new(rows.clone(), output.clone())))
            }
            PlanNode::Filter { predicate, child } => {
                let child = Self::create_executor(ctx, child)?;
                Ok(Box::new(FilterExecutor::new(child, predicate.clone())))
            }
            PlanNode::Projection {
                exprs,
                child,
                output,
            } => {
                let child = Self::create_executor(ctx, child)?;
                Ok(Box::new(ProjectionExecutor::new(
                    child,
                    exprs.clone(),
                    output.clone(),
                )))
            }
            PlanNode::Insert {
                table_oid,
                child,
                output,
            } => {
                let child = Self::create_executor(ctx, child)?;
                let catalog = ctx.catalog.read();
                let table = catalog
                    .table(*table_oid)
                    .ok_or(ExecutionError::TableNotFound(*table_oid))?;
                let indexes = catalog.indexes_for_table(&table.name);
                Ok(Box::new(InsertExecutor::new(
                    ctx.clone(),
                    table,
                    indexes,
                    child,
                    output.clone(),
                )))
            }
            PlanNode::Update {
                table_oid,
                target_exprs,
                child,
                output,
            } => {
                let child = Self::create_executor(ctx, child)?;
                let catalog = ctx.catalog.read();
                let table = catalog
                    .table(*table_oid)
                    .ok_or(ExecutionError::TableNotFound(*table_oid))?;
                let indexes = catalog.indexes_for_table(&table.name);
                Ok(Box::new(UpdateExecutor::new(
                    ctx.clone(),
                    table,
                    indexes,
                    target_exprs.clone(),
                    child,
                    output.clone(),
                )))
            }
            PlanNode::Delete {
                table_oid,
                child,
                output,
            } => {
                let child = Self::create_executor(ctx, child)?;
                let table = ctx
                    .catalog
                    .read()
                    .table(*table_oid)
                    .ok_or(ExecutionError::TableNotFound(*table_oid))?;
                Ok(Box::new(DeleteExecutor::new(
                    ctx.clone(),
                    table,
                    child,
                    output.clone(),
                )))
            }
            PlanNode::NestedLoopJoin {
                left,
                right,
                predicate,
                join_type,
                output,
            } => {
                let left = Self::create_executor(ctx, left)?;
                let right = Self::create_executor(ctx, right)?;
                Ok(Box::new(NestedLoopJoinExecutor::new(
                    left,
                    right,
                    predicate.clone(),
                    *join_type,
                    output.clone(),
                )))
            }
            PlanNode::HashJoin {
                left,
                right,
                left_keys,
                right_keys,
                join_type,
                output,
            } => {
                let left = Self::create_executor(ctx, left)?;
                let right = Self::create_executor(ctx, right)?;
                Ok(Box::new(HashJoinExecutor::new(
                    left,
                    right,
                    left_keys.clone(),
                    right_keys.clone(),
                    *join_type,
                    output.clone(),
                )))
            }
            PlanNode::Aggregation {
                child,
                group_by,
                aggregates,
                output,
            } => {
                let child = Self::create_executor(ctx, child)?;
                Ok(Box::new(AggregationExecutor::new(
                    child,
                    group_by.clone(),
                    aggregates.clone(),
                    output.clone(),
                )))
            }
            PlanNode::Sort { child, order_by } => {
                let child = Self::create_executor(ctx, child)?;
                Ok(Box::new(SortExecutor::new(child, order_by.clone())))
            }
            PlanNode::TopN {
                child,
                order_by,
                n,
            } => {
                let child = Self::create_executor(ctx, child)?;
                Ok(Box::new(TopNExecutor::new(child, order_by.clone(), *n)))
            }
            PlanNode::Window {
                child,
                columns,
                output,
            } => {
                let child = Self::create_executor(ctx, child)?;
                Ok(Box::new(WindowExecutor::new(
                    child,
                    columns.clone(),
                    output.clone(),
                )))
            }
        }
    }

    /// Convenience driver: build, init, and drain a plan.
    pub fn execute(ctx: &Arc<ExecutorContext>, plan: &PlanNode) -> ExecResult<Vec<(Tuple, Rid)>> {
        let mut executor = Self::create_executor(ctx, plan)?;
        executor.init()?;
        let mut rows = Vec::new();
        while let Some(row) = executor.next()? {
            rows.push(row);
        }
        Ok(rows)
    }
}

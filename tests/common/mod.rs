use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tempfile::NamedTempFile;

use onegadb::catalog::{Catalog, Column, DataType, Schema, TableInfo};
use onegadb::common::config::{BufferPoolConfig, HashTableConfig};
use onegadb::execution::{ExecutorContext, ExecutorFactory, PlanNode};
use onegadb::execution::expression::Expression;
use onegadb::storage::buffer::BufferPoolManager;
use onegadb::storage::table::{DataValue, Tuple};
use onegadb::transaction::{Transaction, TransactionManager};

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a buffer pool manager with a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(
    pool_size: usize,
) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let config = BufferPoolConfig {
        pool_size,
        replacer_k: 2,
    };
    let buffer_pool = BufferPoolManager::new(config, path)?;
    Ok((buffer_pool, file))
}

/// Everything a scenario test needs: pool, catalog, transaction manager,
/// and the backing temp file kept alive.
pub struct TestEngine {
    pub bpm: Arc<BufferPoolManager>,
    pub catalog: Arc<RwLock<Catalog>>,
    pub txn_mgr: Arc<TransactionManager>,
    _file: NamedTempFile,
}

#[allow(dead_code)]
impl TestEngine {
    pub fn new() -> Result<Self> {
        let (bpm, file) = create_test_buffer_pool(64)?;
        let catalog = Arc::new(RwLock::new(Catalog::new(bpm.clone())));
        let txn_mgr = Arc::new(TransactionManager::new(catalog.clone()));
        Ok(Self {
            bpm,
            catalog,
            txn_mgr,
            _file: file,
        })
    }

    /// `accounts(id INTEGER PRIMARY KEY, name TEXT, balance INTEGER)`
    pub fn create_accounts_table(&self) -> Result<Arc<TableInfo>> {
        let schema = Schema::new(vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::Text),
            Column::new("balance", DataType::Integer),
        ]);
        let mut catalog = self.catalog.write();
        let table = catalog.create_table("accounts", schema)?;
        catalog.create_index(
            "accounts_pk",
            "accounts",
            vec![0],
            true,
            HashTableConfig::default(),
        )?;
        Ok(table)
    }

    pub fn ctx(&self, txn: &Arc<Transaction>) -> Arc<ExecutorContext> {
        ExecutorContext::new(
            txn.clone(),
            self.txn_mgr.clone(),
            self.catalog.clone(),
            self.bpm.clone(),
        )
    }

    /// Run an insert plan feeding the given literal rows.
    pub fn insert_rows(
        &self,
        txn: &Arc<Transaction>,
        table: &TableInfo,
        rows: Vec<Vec<DataValue>>,
    ) -> Result<i64, onegadb::execution::ExecutionError> {
        let values = PlanNode::Values {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Expression::constant).collect())
                .collect(),
            output: table.schema.clone(),
        };
        let plan = PlanNode::insert(table.oid, values);
        let result = ExecutorFactory::execute(&self.ctx(txn), &plan)?;
        match result[0].0.value(0) {
            DataValue::Integer(n) => Ok(*n),
            other => panic!("unexpected count value {:?}", other),
        }
    }

    /// Scan every visible row of a table under the given transaction.
    pub fn scan_all(
        &self,
        txn: &Arc<Transaction>,
        table: &TableInfo,
        filter: Option<Expression>,
    ) -> Result<Vec<Tuple>, onegadb::execution::ExecutionError> {
        let plan = PlanNode::SeqScan {
            table_oid: table.oid,
            filter,
            output: table.schema.clone(),
        };
        Ok(ExecutorFactory::execute(&self.ctx(txn), &plan)?
            .into_iter()
            .map(|(t, _)| t)
            .collect())
    }

    /// Update every row matched by `filter`, rewriting with target
    /// expressions.
    pub fn update_rows(
        &self,
        txn: &Arc<Transaction>,
        table: &TableInfo,
        target_exprs: Vec<Expression>,
        filter: Option<Expression>,
    ) -> Result<i64, onegadb::execution::ExecutionError> {
        let scan = PlanNode::SeqScan {
            table_oid: table.oid,
            filter,
            output: table.schema.clone(),
        };
        let plan = PlanNode::update(table.oid, target_exprs, scan);
        let result = ExecutorFactory::execute(&self.ctx(txn), &plan)?;
        match result[0].0.value(0) {
            DataValue::Integer(n) => Ok(*n),
            other => panic!("unexpected count value {:?}", other),
        }
    }

    /// Delete every row matched by `filter`.
    pub fn delete_rows(
        &self,
        txn: &Arc<Transaction>,
        table: &TableInfo,
        filter: Option<Expression>,
    ) -> Result<i64, onegadb::execution::ExecutionError> {
        let scan = PlanNode::SeqScan {
            table_oid: table.oid,
            filter,
            output: table.schema.clone(),
        };
        let plan = PlanNode::delete(table.oid, scan);
        let result = ExecutorFactory::execute(&self.ctx(txn), &plan)?;
        match result[0].0.value(0) {
            DataValue::Integer(n) => Ok(*n),
            other => panic!("unexpected count value {:?}", other),
        }
    }
}

/// `id = <value>` over column 0.
#[allow(dead_code)]
pub fn id_equals(value: i64) -> Expression {
    Expression::comparison(
        onegadb::execution::ComparisonOp::Eq,
        Expression::column(0),
        Expression::constant(DataValue::Integer(value)),
    )
}

#[allow(dead_code)]
pub fn account_row(id: i64, name: &str, balance: i64) -> Vec<DataValue> {
    vec![
        DataValue::Integer(id),
        DataValue::Text(name.to_string()),
        DataValue::Integer(balance),
    ]
}

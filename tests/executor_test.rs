use anyhow::Result;

mod common;
use common::{account_row, id_equals, TestEngine};

use onegadb::catalog::{Column, DataType, Schema};
use onegadb::execution::expression::Expression;
use onegadb::execution::{
    AggregateExpr, AggregationType, ComparisonOp, ExecutorFactory, JoinType, OrderDirection,
    PlanNode,
};
use onegadb::optimizer::{NljAsHashJoin, SeqScanAsIndexScan};
use onegadb::storage::table::DataValue;
use onegadb::transaction::IsolationLevel;

fn int(v: &DataValue) -> i64 {
    match v {
        DataValue::Integer(i) => *i,
        other => panic!("expected integer, got {:?}", other),
    }
}

#[test]
fn test_seq_scan_with_filter() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(
        &txn,
        &table,
        vec![
            account_row(1, "a", 10),
            account_row(2, "b", 20),
            account_row(3, "c", 30),
        ],
    )?;
    engine.txn_mgr.commit(&txn)?;

    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let filter = Expression::comparison(
        ComparisonOp::GtEq,
        Expression::column(2),
        Expression::constant(DataValue::Integer(20)),
    );
    let rows = engine.scan_all(&reader, &table, Some(filter))?;
    assert_eq!(rows.len(), 2);
    Ok(())
}

#[test]
fn test_sort_hundred_rows_two_keys() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    // 100 rows: c1 = id % 10 stored in balance, c2 = id.
    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let rows: Vec<_> = (0..100)
        .map(|i| account_row(i, "row", i % 10))
        .collect();
    engine.insert_rows(&txn, &table, rows)?;
    engine.txn_mgr.commit(&txn)?;

    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let plan = PlanNode::Sort {
        child: Box::new(PlanNode::SeqScan {
            table_oid: table.oid,
            filter: None,
            output: table.schema.clone(),
        }),
        order_by: vec![
            (OrderDirection::Desc, Expression::column(2)),
            (OrderDirection::Asc, Expression::column(0)),
        ],
    };
    let out = ExecutorFactory::execute(&engine.ctx(&reader), &plan)?;
    assert_eq!(out.len(), 100);

    // Monotonically non-increasing in balance; within equal balances,
    // non-decreasing in id.
    for window in out.windows(2) {
        let (a, b) = (&window[0].0, &window[1].0);
        let (ba, bb) = (int(a.value(2)), int(b.value(2)));
        assert!(ba >= bb);
        if ba == bb {
            assert!(int(a.value(0)) <= int(b.value(0)));
        }
    }
    Ok(())
}

#[test]
fn test_top_n_returns_bounded_sorted_prefix() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let rows: Vec<_> = (0..50).map(|i| account_row(i, "r", 1000 - i)).collect();
    engine.insert_rows(&txn, &table, rows)?;
    engine.txn_mgr.commit(&txn)?;

    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let plan = PlanNode::TopN {
        child: Box::new(PlanNode::SeqScan {
            table_oid: table.oid,
            filter: None,
            output: table.schema.clone(),
        }),
        order_by: vec![(OrderDirection::Asc, Expression::column(2))],
        n: 5,
    };
    let out = ExecutorFactory::execute(&engine.ctx(&reader), &plan)?;
    let balances: Vec<i64> = out.iter().map(|(t, _)| int(t.value(2))).collect();
    assert_eq!(balances, vec![951, 952, 953, 954, 955]);
    Ok(())
}

#[test]
fn test_aggregation_over_table() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(
        &txn,
        &table,
        vec![
            account_row(1, "a", 10),
            account_row(2, "a", 20),
            account_row(3, "b", 5),
        ],
    )?;
    engine.txn_mgr.commit(&txn)?;

    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let plan = PlanNode::Aggregation {
        child: Box::new(PlanNode::SeqScan {
            table_oid: table.oid,
            filter: None,
            output: table.schema.clone(),
        }),
        group_by: vec![Expression::column(1)],
        aggregates: vec![
            AggregateExpr {
                ty: AggregationType::CountStar,
                arg: None,
            },
            AggregateExpr {
                ty: AggregationType::Sum,
                arg: Some(Expression::column(2)),
            },
        ],
        output: Schema::new(vec![
            Column::new("name", DataType::Text),
            Column::new("cnt", DataType::Integer),
            Column::new("total", DataType::Integer),
        ]),
    };
    let out = ExecutorFactory::execute(&engine.ctx(&reader), &plan)?;
    assert_eq!(out.len(), 2);
    for (tuple, _) in &out {
        match tuple.value(0) {
            DataValue::Text(name) if name == "a" => {
                assert_eq!(int(tuple.value(1)), 2);
                assert_eq!(int(tuple.value(2)), 30);
            }
            DataValue::Text(name) if name == "b" => {
                assert_eq!(int(tuple.value(1)), 1);
                assert_eq!(int(tuple.value(2)), 5);
            }
            other => panic!("unexpected group {:?}", other),
        }
    }
    Ok(())
}

#[test]
fn test_aggregation_of_empty_table_without_groups() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let plan = PlanNode::Aggregation {
        child: Box::new(PlanNode::SeqScan {
            table_oid: table.oid,
            filter: None,
            output: table.schema.clone(),
        }),
        group_by: vec![],
        aggregates: vec![
            AggregateExpr {
                ty: AggregationType::CountStar,
                arg: None,
            },
            AggregateExpr {
                ty: AggregationType::Max,
                arg: Some(Expression::column(2)),
            },
        ],
        output: Schema::new(vec![
            Column::new("cnt", DataType::Integer),
            Column::new("max", DataType::Integer),
        ]),
    };
    let out = ExecutorFactory::execute(&engine.ctx(&reader), &plan)?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0.value(0), &DataValue::Integer(0));
    assert_eq!(out[0].0.value(1), &DataValue::Null);
    Ok(())
}

fn orders_table(engine: &TestEngine) -> Result<std::sync::Arc<onegadb::catalog::TableInfo>> {
    let schema = Schema::new(vec![
        Column::new("account_id", DataType::Integer),
        Column::new("amount", DataType::Integer),
    ]);
    Ok(engine.catalog.write().create_table("orders", schema)?)
}

fn join_plan(
    accounts: &onegadb::catalog::TableInfo,
    orders: &onegadb::catalog::TableInfo,
    join_type: JoinType,
) -> PlanNode {
    PlanNode::NestedLoopJoin {
        left: Box::new(PlanNode::SeqScan {
            table_oid: accounts.oid,
            filter: None,
            output: accounts.schema.clone(),
        }),
        right: Box::new(PlanNode::SeqScan {
            table_oid: orders.oid,
            filter: None,
            output: orders.schema.clone(),
        }),
        predicate: Some(Expression::comparison(
            ComparisonOp::Eq,
            Expression::column_of(0, 0),
            Expression::column_of(1, 0),
        )),
        join_type,
        output: accounts.schema.join(&orders.schema),
    }
}

fn seed_join_tables(
    engine: &TestEngine,
) -> Result<(
    std::sync::Arc<onegadb::catalog::TableInfo>,
    std::sync::Arc<onegadb::catalog::TableInfo>,
)> {
    let accounts = engine.create_accounts_table()?;
    let orders = orders_table(engine)?;

    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(
        &txn,
        &accounts,
        vec![
            account_row(1, "alice", 10),
            account_row(2, "bob", 20),
            account_row(3, "carol", 30),
        ],
    )?;
    engine.insert_rows(
        &txn,
        &orders,
        vec![
            vec![DataValue::Integer(1), DataValue::Integer(101)],
            vec![DataValue::Integer(2), DataValue::Integer(102)],
            vec![DataValue::Integer(2), DataValue::Integer(103)],
        ],
    )?;
    engine.txn_mgr.commit(&txn)?;
    Ok((accounts, orders))
}

#[test]
fn test_nested_loop_join_inner_and_left() -> Result<()> {
    let engine = TestEngine::new()?;
    let (accounts, orders) = seed_join_tables(&engine)?;
    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);

    let inner = ExecutorFactory::execute(
        &engine.ctx(&reader),
        &join_plan(&accounts, &orders, JoinType::Inner),
    )?;
    assert_eq!(inner.len(), 3);

    let left = ExecutorFactory::execute(
        &engine.ctx(&reader),
        &join_plan(&accounts, &orders, JoinType::Left),
    )?;
    assert_eq!(left.len(), 4);
    let unmatched: Vec<_> = left
        .iter()
        .filter(|(t, _)| t.value(3) == &DataValue::Null)
        .collect();
    assert_eq!(unmatched.len(), 1);
    assert_eq!(unmatched[0].0.value(0), &DataValue::Integer(3));
    Ok(())
}

#[test]
fn test_nlj_rewrites_to_hash_join_with_same_results() -> Result<()> {
    let engine = TestEngine::new()?;
    let (accounts, orders) = seed_join_tables(&engine)?;
    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);

    let plan = join_plan(&accounts, &orders, JoinType::Left);
    let optimized = NljAsHashJoin::new().optimize(plan);
    assert!(matches!(optimized, PlanNode::HashJoin { .. }));

    let mut rows = ExecutorFactory::execute(&engine.ctx(&reader), &optimized)?
        .into_iter()
        .map(|(t, _)| (int(t.value(0)), t.value(4).clone()))
        .collect::<Vec<_>>();
    rows.sort_by_key(|(id, _)| *id);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[3], (3, DataValue::Null));
    Ok(())
}

#[test]
fn test_seq_scan_rewrites_to_index_point_lookup() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(
        &txn,
        &table,
        vec![account_row(1, "a", 10), account_row(2, "b", 20)],
    )?;
    engine.txn_mgr.commit(&txn)?;

    let plan = PlanNode::SeqScan {
        table_oid: table.oid,
        filter: Some(id_equals(2)),
        output: table.schema.clone(),
    };
    let optimized = {
        let catalog = engine.catalog.read();
        SeqScanAsIndexScan::new(&catalog).optimize(plan)
    };
    assert!(matches!(optimized, PlanNode::IndexScan { .. }));

    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let out = ExecutorFactory::execute(&engine.ctx(&reader), &optimized)?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0.value(1), &DataValue::Text("b".to_string()));
    Ok(())
}

#[test]
fn test_index_scan_respects_visibility() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(&txn, &table, vec![account_row(5, "e", 50)])?;
    engine.txn_mgr.commit(&txn)?;

    // Delete the row; a point lookup through the stale index entry must
    // come back empty for new snapshots.
    let deleter = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.delete_rows(&deleter, &table, Some(id_equals(5)))?;
    engine.txn_mgr.commit(&deleter)?;

    let plan = PlanNode::SeqScan {
        table_oid: table.oid,
        filter: Some(id_equals(5)),
        output: table.schema.clone(),
    };
    let optimized = {
        let catalog = engine.catalog.read();
        SeqScanAsIndexScan::new(&catalog).optimize(plan)
    };
    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let out = ExecutorFactory::execute(&engine.ctx(&reader), &optimized)?;
    assert!(out.is_empty());
    Ok(())
}

#[test]
fn test_projection_over_scan() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(&txn, &table, vec![account_row(1, "a", 41)])?;
    engine.txn_mgr.commit(&txn)?;

    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let plan = PlanNode::Projection {
        exprs: vec![Expression::Arithmetic {
            op: onegadb::execution::expression::ArithmeticOp::Add,
            left: Box::new(Expression::column(2)),
            right: Box::new(Expression::constant(DataValue::Integer(1))),
        }],
        child: Box::new(PlanNode::SeqScan {
            table_oid: table.oid,
            filter: None,
            output: table.schema.clone(),
        }),
        output: Schema::new(vec![Column::new("next", DataType::Integer)]),
    };
    let out = ExecutorFactory::execute(&engine.ctx(&reader), &plan)?;
    assert_eq!(out[0].0.value(0), &DataValue::Integer(42));
    Ok(())
}

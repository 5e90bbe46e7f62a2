use anyhow::Result;

mod common;
use common::{account_row, id_equals, TestEngine};

use onegadb::execution::expression::Expression;
use onegadb::execution::ExecutionError;
use onegadb::storage::table::DataValue;
use onegadb::transaction::{IsolationLevel, TransactionState};

fn balance_of(tuple: &onegadb::storage::table::Tuple) -> i64 {
    match tuple.value(2) {
        DataValue::Integer(v) => *v,
        other => panic!("unexpected balance {:?}", other),
    }
}

/// Target expressions for "set balance = <value>".
fn set_balance(value: i64) -> Vec<Expression> {
    vec![
        Expression::column(0),
        Expression::column(1),
        Expression::constant(DataValue::Integer(value)),
    ]
}

#[test]
fn test_snapshot_read_sees_pre_update_version() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let setup = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(&setup, &table, vec![account_row(1, "alice", 100)])?;
    engine.txn_mgr.commit(&setup)?;

    // Two readers share the same snapshot.
    let t1 = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let t2 = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    assert_eq!(t1.read_ts(), t2.read_ts());

    let before = engine.scan_all(&t2, &table, None)?;
    assert_eq!(balance_of(&before[0]), 100);

    // T1 updates and commits at a newer timestamp.
    assert_eq!(engine.update_rows(&t1, &table, set_balance(200), None)?, 1);
    engine.txn_mgr.commit(&t1)?;

    // T2 still reconstructs the old version from T1's undo log.
    let after = engine.scan_all(&t2, &table, None)?;
    assert_eq!(after.len(), 1);
    assert_eq!(balance_of(&after[0]), 100);

    // A fresh reader sees the new version.
    let t3 = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let fresh = engine.scan_all(&t3, &table, None)?;
    assert_eq!(balance_of(&fresh[0]), 200);
    Ok(())
}

#[test]
fn test_concurrent_update_is_write_write_conflict() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let setup = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(&setup, &table, vec![account_row(1, "alice", 100)])?;
    engine.txn_mgr.commit(&setup)?;

    let t3 = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let t4 = engine.txn_mgr.begin(IsolationLevel::Snapshot);

    // T3 writes the row; its temporary timestamp is now on the tuple.
    assert_eq!(engine.update_rows(&t3, &table, set_balance(150), None)?, 1);

    // T4 sees a version newer than its snapshot that it did not write.
    let err = engine
        .update_rows(&t4, &table, set_balance(175), None)
        .unwrap_err();
    assert!(matches!(err, ExecutionError::WriteWriteConflict(_)));
    assert_eq!(t4.state(), TransactionState::Tainted);

    // A tainted transaction fails fast on any further DML.
    let err = engine
        .update_rows(&t4, &table, set_balance(180), None)
        .unwrap_err();
    assert!(matches!(err, ExecutionError::TransactionTainted));

    engine.txn_mgr.abort(&t4)?;
    engine.txn_mgr.commit(&t3)?;

    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let rows = engine.scan_all(&reader, &table, None)?;
    assert_eq!(balance_of(&rows[0]), 150);
    Ok(())
}

#[test]
fn test_insert_after_aborted_insert_of_same_key() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    // T5 inserts key 7 and aborts.
    let t5 = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(&t5, &table, vec![account_row(7, "ghost", 1)])?;
    engine.txn_mgr.abort(&t5)?;

    // Nobody sees the aborted row.
    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    assert!(engine.scan_all(&reader, &table, None)?.is_empty());

    // T6 reuses the key; the tombstoned slot is revived.
    let t6 = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    assert_eq!(
        engine.insert_rows(&t6, &table, vec![account_row(7, "real", 2)])?,
        1
    );
    engine.txn_mgr.commit(&t6)?;

    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let rows = engine.scan_all(&reader, &table, None)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value(1), &DataValue::Text("real".to_string()));
    Ok(())
}

#[test]
fn test_duplicate_key_insert_taints() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let setup = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(&setup, &table, vec![account_row(1, "alice", 100)])?;
    engine.txn_mgr.commit(&setup)?;

    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let err = engine
        .insert_rows(&txn, &table, vec![account_row(1, "clone", 5)])
        .unwrap_err();
    assert!(matches!(err, ExecutionError::KeyAlreadyExists));
    assert_eq!(txn.state(), TransactionState::Tainted);
    engine.txn_mgr.abort(&txn)?;
    Ok(())
}

#[test]
fn test_abort_restores_previous_version() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let setup = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(&setup, &table, vec![account_row(1, "alice", 100)])?;
    engine.txn_mgr.commit(&setup)?;

    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.update_rows(&txn, &table, set_balance(999), None)?;
    engine.txn_mgr.abort(&txn)?;

    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let rows = engine.scan_all(&reader, &table, None)?;
    assert_eq!(balance_of(&rows[0]), 100);
    Ok(())
}

#[test]
fn test_delete_then_snapshot_visibility() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let setup = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(
        &setup,
        &table,
        vec![account_row(1, "alice", 100), account_row(2, "bob", 50)],
    )?;
    engine.txn_mgr.commit(&setup)?;

    let old_reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);

    let deleter = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    assert_eq!(
        engine.delete_rows(&deleter, &table, Some(id_equals(1)))?,
        1
    );
    // The deleter no longer sees the row.
    assert_eq!(engine.scan_all(&deleter, &table, None)?.len(), 1);
    engine.txn_mgr.commit(&deleter)?;

    // The old snapshot still reconstructs the deleted row.
    let rows = engine.scan_all(&old_reader, &table, None)?;
    assert_eq!(rows.len(), 2);

    // New snapshots do not.
    let new_reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    assert_eq!(engine.scan_all(&new_reader, &table, None)?.len(), 1);
    Ok(())
}

#[test]
fn test_self_modification_merges_undo_logs() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let setup = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(&setup, &table, vec![account_row(1, "alice", 100)])?;
    engine.txn_mgr.commit(&setup)?;

    let old_reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);

    // Two updates of the same row by one transaction: a single undo log.
    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.update_rows(&txn, &table, set_balance(200), None)?;
    engine.update_rows(&txn, &table, set_balance(300), None)?;
    assert_eq!(txn.undo_log_count(), 1);
    engine.txn_mgr.commit(&txn)?;

    // The merged log still restores the original version.
    let rows = engine.scan_all(&old_reader, &table, None)?;
    assert_eq!(balance_of(&rows[0]), 100);
    Ok(())
}

#[test]
fn test_double_commit_and_double_abort_rejected() -> Result<()> {
    let engine = TestEngine::new()?;
    engine.create_accounts_table()?;

    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.txn_mgr.commit(&txn)?;
    assert!(engine.txn_mgr.commit(&txn).is_err());
    assert!(engine.txn_mgr.abort(&txn).is_err());

    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.txn_mgr.abort(&txn)?;
    assert!(engine.txn_mgr.abort(&txn).is_err());
    assert!(engine.txn_mgr.commit(&txn).is_err());
    Ok(())
}

#[test]
fn test_watermark_tracks_oldest_running_snapshot() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let setup = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(&setup, &table, vec![account_row(1, "alice", 100)])?;
    engine.txn_mgr.commit(&setup)?;
    let committed_ts = engine.txn_mgr.last_commit_ts();

    let old = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let writer = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.update_rows(&writer, &table, set_balance(200), None)?;
    engine.txn_mgr.commit(&writer)?;

    // The old reader pins the watermark at its snapshot.
    assert_eq!(engine.txn_mgr.watermark(), committed_ts);
    engine.txn_mgr.commit(&old)?;
    assert_eq!(engine.txn_mgr.watermark(), engine.txn_mgr.last_commit_ts());
    Ok(())
}

#[test]
fn test_garbage_collection_reclaims_invisible_versions() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let setup = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(&setup, &table, vec![account_row(1, "alice", 100)])?;
    engine.txn_mgr.commit(&setup)?;

    let updater = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.update_rows(&updater, &table, set_balance(200), None)?;
    engine.txn_mgr.commit(&updater)?;

    assert!(engine.txn_mgr.txn_count() >= 2);

    // Nothing runs: every undo log is below the watermark.
    engine.txn_mgr.garbage_collection();
    assert_eq!(engine.txn_mgr.txn_count(), 0);

    // The table remains intact for new readers after collection.
    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let rows = engine.scan_all(&reader, &table, None)?;
    assert_eq!(balance_of(&rows[0]), 200);
    Ok(())
}

#[test]
fn test_garbage_collection_retains_reachable_versions() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let setup = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(&setup, &table, vec![account_row(1, "alice", 100)])?;
    engine.txn_mgr.commit(&setup)?;

    // This reader keeps the pre-update version reachable.
    let old_reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);

    let updater = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.update_rows(&updater, &table, set_balance(200), None)?;
    engine.txn_mgr.commit(&updater)?;

    engine.txn_mgr.garbage_collection();

    // The updater's undo log must survive; the old reader still needs it.
    let rows = engine.scan_all(&old_reader, &table, None)?;
    assert_eq!(balance_of(&rows[0]), 100);
    engine.txn_mgr.commit(&old_reader)?;
    Ok(())
}

#[test]
fn test_version_chain_dump_shows_undo_history() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let setup = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(&setup, &table, vec![account_row(1, "alice", 100)])?;
    engine.txn_mgr.commit(&setup)?;

    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.update_rows(&txn, &table, set_balance(200), None)?;

    let dump = onegadb::execution::common::format_version_chain(&engine.txn_mgr, &table);
    // Uncommitted head renders with a transaction-relative timestamp and
    // the chain shows the prior version.
    assert!(dump.contains("RID="), "dump was: {}", dump);
    assert!(dump.contains("ts=txn"), "dump was: {}", dump);
    assert!(dump.contains("ts=1"), "dump was: {}", dump);

    engine.txn_mgr.commit(&txn)?;
    Ok(())
}

#[test]
fn test_primary_key_update_moves_row() -> Result<()> {
    let engine = TestEngine::new()?;
    let table = engine.create_accounts_table()?;

    let setup = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    engine.insert_rows(&setup, &table, vec![account_row(1, "alice", 100)])?;
    engine.txn_mgr.commit(&setup)?;

    // Rewrite the key column: delete of key 1 plus insert of key 9.
    let txn = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let targets = vec![
        Expression::constant(DataValue::Integer(9)),
        Expression::column(1),
        Expression::column(2),
    ];
    assert_eq!(engine.update_rows(&txn, &table, targets, None)?, 1);
    engine.txn_mgr.commit(&txn)?;

    let reader = engine.txn_mgr.begin(IsolationLevel::Snapshot);
    let rows = engine.scan_all(&reader, &table, None)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value(0), &DataValue::Integer(9));

    // The new key also resolves through the primary index.
    let visible = engine.scan_all(&reader, &table, Some(id_equals(9)))?;
    assert_eq!(visible.len(), 1);
    Ok(())
}

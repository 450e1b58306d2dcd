use std::sync::Arc;
use std::time::Duration;

use blocking_tx_driver::prelude::*;
use blocking_tx_driver::test_utils::{Event, MemoryTransport};

const SHORT: Duration = Duration::from_millis(50);
const LONG: Duration = Duration::from_millis(500);

fn open(config: ConnectionConfig) -> Result<(Arc<MemoryTransport>, Connection), DriverError> {
    let transport = Arc::new(MemoryTransport::new());
    transport.create_table(
        "jobs",
        vec![
            ColumnMetadata::new("id", AtomType::Int8),
            ColumnMetadata::new("state", AtomType::Character),
        ],
    );
    transport.seed_row("jobs", vec![WireValue::Int8(1), WireValue::Character("queued".into())]);
    let conn = Connection::open(transport.clone(), config)?;
    Ok((transport, conn))
}

fn timed_out(result: Result<impl std::fmt::Debug, DriverError>, operation: &str) -> bool {
    matches!(result, Err(DriverError::Timeout { operation: op, .. }) if op == operation)
}

#[test]
fn slow_begin_times_out_and_leaves_no_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConnectionConfig::builder().begin_timeout(SHORT).finish();
    let (transport, conn) = open(config)?;
    transport.delay(Operation::Begin, LONG);

    let mut stmt = conn.create_statement()?;
    assert!(timed_out(stmt.execute_query("select * from jobs"), "begin"));
    assert!(conn.coordinator().current().is_none());
    assert_eq!(transport.count(|e| matches!(e, Event::Begin { .. })), 0);
    assert_eq!(transport.prepared_count(), 0);

    transport.clear_delays();
    let mut cursor = stmt.execute_query("select * from jobs")?;
    assert!(cursor.advance()?);
    Ok(())
}

#[test]
fn query_timeout_bounds_fetches() -> Result<(), Box<dyn std::error::Error>> {
    let (transport, conn) = open(ConnectionConfig::default())?;
    let mut stmt = conn.create_statement()?;
    stmt.set_query_timeout(Some(SHORT));

    let mut cursor = stmt.execute_query("select * from jobs")?;
    transport.delay(Operation::Fetch, LONG);
    assert!(timed_out(cursor.advance(), "fetch"));

    transport.clear_delays();
    cursor.close()?;
    assert_eq!(transport.open_cursor_count(), 0);
    assert_eq!(transport.count(|e| matches!(e, Event::Commit { .. })), 1);
    Ok(())
}

#[test]
fn slow_commit_still_clears_the_slot() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConnectionConfig::builder()
        .autocommit(false)
        .commit_timeout(SHORT)
        .finish();
    let (transport, conn) = open(config)?;
    conn.create_statement()?
        .execute_update("insert into jobs values (2, 'running')")?;

    transport.delay(Operation::Commit, LONG);
    assert!(timed_out(conn.commit(), "commit"));
    assert!(conn.coordinator().current().is_none());
    assert_eq!(transport.open_transaction_count(), 0);

    transport.clear_delays();
    conn.commit()?;
    assert_eq!(transport.committed_rows("jobs").len(), 1);
    Ok(())
}

#[test]
fn autocommit_update_timeout_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConnectionConfig::builder().default_timeout(SHORT).finish();
    let (transport, conn) = open(config)?;
    transport.delay(Operation::Execute, LONG);

    let mut stmt = conn.create_statement()?;
    assert!(timed_out(
        stmt.execute_update("insert into jobs values (3, 'lost')"),
        "execute"
    ));
    assert_eq!(transport.count(|e| matches!(e, Event::Rollback { .. })), 1);
    assert_eq!(transport.count(|e| matches!(e, Event::Commit { .. })), 0);
    assert_eq!(transport.open_transaction_count(), 0);
    assert_eq!(transport.committed_rows("jobs").len(), 1);
    Ok(())
}

#[test]
fn transport_failures_are_classified() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConnectionConfig::builder().autocommit(false).finish();
    let (transport, conn) = open(config)?;
    let mut stmt = conn.create_statement()?;

    transport.fail_next(Operation::Begin, "session expired");
    let err = stmt.execute_query("select * from jobs").unwrap_err();
    assert!(matches!(err, DriverError::TransactionBegin(ref m) if m.contains("session expired")));

    stmt.execute_update("insert into jobs values (4, 'done')")?;
    transport.fail_next(Operation::Commit, "serialization failure");
    assert!(matches!(conn.commit(), Err(DriverError::Commit(_))));
    assert!(conn.coordinator().current().is_none());

    transport.fail_next(Operation::Prepare, "syntax error");
    assert!(matches!(
        stmt.execute_update("insert into jobs values (5, 'x')"),
        Err(DriverError::Execution(_))
    ));
    Ok(())
}

#[test]
fn manual_execute_timeout_abandons_the_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConnectionConfig::builder()
        .autocommit(false)
        .execute_timeout(SHORT)
        .finish();
    let (transport, conn) = open(config)?;
    let mut stmt = conn.create_statement()?;
    stmt.execute_update("insert into jobs values (6, 'staged')")?;

    transport.delay(Operation::Execute, LONG);
    assert!(timed_out(
        stmt.execute_update("insert into jobs values (7, 'slow')"),
        "execute"
    ));
    assert!(conn.coordinator().current().is_none());
    assert_eq!(transport.count(|e| matches!(e, Event::Rollback { .. })), 1);

    transport.clear_delays();
    conn.commit()?;
    assert_eq!(transport.committed_rows("jobs").len(), 1);
    Ok(())
}

#[test]
fn open_on_needs_a_multi_thread_runtime() -> Result<(), Box<dyn std::error::Error>> {
    let current = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let err = Connection::open_on(
        Arc::new(MemoryTransport::new()),
        ConnectionConfig::default(),
        current.handle().clone(),
    )
    .unwrap_err();
    assert!(matches!(err, DriverError::Config(_)));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    let transport = Arc::new(MemoryTransport::new());
    transport.create_table("jobs", vec![ColumnMetadata::new("id", AtomType::Int8)]);
    let config = ConnectionConfig::builder().commit_timeout(SHORT).finish();
    let conn = Connection::open_on(transport.clone(), config, runtime.handle().clone())?;
    conn.create_statement()?
        .execute_update("insert into jobs values (1)")?;
    assert_eq!(transport.committed_rows("jobs").len(), 1);
    Ok(())
}

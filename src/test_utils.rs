//! In-memory [`SessionTransport`] for tests.
//!
//! Understands a handful of statement shapes:
//! - `insert into <table> values (<literals>)`, or `insert into <table>` with the row
//!   taken from the bound parameters
//! - `delete from <table>`
//! - `select * from <table>`
//! - any text registered with [`MemoryTransport::script_query`]
//!
//! Writes are staged per transaction and applied on commit. Every call is
//! recorded in an event log; failures and delays can be injected per operation.

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::config::Operation;
use crate::transaction::TransactionOptions;
use crate::transport::{
    Placeholder, RemoteCursor, RemotePrepared, RemoteTransaction, SessionTransport, TransportError,
    WireParameter,
};
use crate::types::{AtomType, ColumnMetadata, LobReference, WireValue};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin { tx: u64 },
    Commit { tx: u64 },
    Rollback { tx: u64 },
    CloseTransaction { tx: u64 },
    Prepare { prepared: u64, placeholders: Vec<AtomType> },
    DisposePrepared { prepared: u64 },
    ExecuteQuery { tx: u64, cursor: u64 },
    ExecuteStatement { tx: u64, count: u64 },
    CloseCursor { cursor: u64 },
}

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<ColumnMetadata>,
    rows: Vec<Vec<WireValue>>,
}

#[derive(Debug, Clone)]
enum Write {
    Insert(String, Vec<WireValue>),
    Clear(String),
}

#[derive(Debug)]
struct CursorState {
    columns: Vec<ColumnMetadata>,
    rows: VecDeque<Vec<WireValue>>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    tables: HashMap<String, Table>,
    scripted: HashMap<String, Table>,
    open_transactions: HashMap<u64, Vec<Write>>,
    prepared: HashMap<u64, String>,
    cursors: HashMap<u64, CursorState>,
    lobs: HashMap<u64, Vec<u8>>,
    events: Vec<Event>,
    begin_options: Vec<TransactionOptions>,
    failures: Vec<(Operation, String)>,
    delays: HashMap<Operation, Duration>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn take_failure(&mut self, op: Operation) -> Result<(), TransportError> {
        match self.failures.iter().position(|(o, _)| *o == op) {
            Some(i) => {
                let (_, message) = self.failures.remove(i);
                Err(TransportError::new(message).with_code("INJECTED"))
            }
            None => Ok(()),
        }
    }

    fn writes(&mut self, tx: &RemoteTransaction) -> Result<&mut Vec<Write>, TransportError> {
        self.open_transactions
            .get_mut(&tx.id)
            .ok_or_else(|| TransportError::new(format!("transaction {} is not open", tx.id)))
    }

    /// Committed rows of `table` with the writes of `tx` applied on top.
    fn visible_rows(&self, table: &str, tx: u64) -> Vec<Vec<WireValue>> {
        let mut rows = self
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default();
        for write in self.open_transactions.get(&tx).into_iter().flatten() {
            match write {
                Write::Insert(t, row) if t == table => rows.push(row.clone()),
                Write::Clear(t) if t == table => rows.clear(),
                _ => {}
            }
        }
        rows
    }
}

/// Shape of a statement, derived from its text.
enum Shape {
    Insert(String, Option<Vec<WireValue>>),
    Delete(String),
    Select(String),
    Other,
}

fn table_after(sql: &str, prefix: &str) -> Option<String> {
    let lower = sql.trim().to_ascii_lowercase();
    let rest = lower.strip_prefix(prefix)?;
    rest.split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn literal(text: &str) -> WireValue {
    let text = text.trim();
    if text.eq_ignore_ascii_case("null") {
        WireValue::Null
    } else if let Some(quoted) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        WireValue::Character(quoted.replace("''", "'"))
    } else if let Ok(v) = text.parse::<i64>() {
        WireValue::Int8(v)
    } else if let Ok(d) = Decimal::from_str(text) {
        WireValue::Decimal(d)
    } else {
        WireValue::Character(text.to_string())
    }
}

fn values_clause(sql: &str) -> Option<Vec<WireValue>> {
    let lower = sql.to_ascii_lowercase();
    let start = lower.find("values")? + "values".len();
    let body = sql[start..].trim().strip_prefix('(')?;
    let body = body.trim_end().trim_end_matches(';').trim_end().strip_suffix(')')?;
    Some(body.split(',').map(literal).collect())
}

fn shape(sql: &str) -> Shape {
    if let Some(table) = table_after(sql, "insert into ") {
        Shape::Insert(table, values_clause(sql))
    } else if let Some(table) = table_after(sql, "delete from ") {
        Shape::Delete(table)
    } else if let Some(table) = table_after(sql, "select * from ") {
        Shape::Select(table)
    } else {
        Shape::Other
    }
}

/// Transport backed by in-process tables.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<State>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn create_table(&self, name: &str, columns: Vec<ColumnMetadata>) {
        self.lock().tables.insert(
            name.to_ascii_lowercase(),
            Table {
                columns,
                rows: Vec::new(),
            },
        );
    }

    /// Add a committed row directly.
    pub fn seed_row(&self, table: &str, row: Vec<WireValue>) {
        if let Some(t) = self.lock().tables.get_mut(&table.to_ascii_lowercase()) {
            t.rows.push(row);
        }
    }

    #[must_use]
    pub fn committed_rows(&self, table: &str) -> Vec<Vec<WireValue>> {
        self.lock()
            .tables
            .get(&table.to_ascii_lowercase())
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Answer `sql` with a fixed result.
    pub fn script_query(&self, sql: &str, columns: Vec<ColumnMetadata>, rows: Vec<Vec<WireValue>>) {
        self.lock()
            .scripted
            .insert(sql.to_string(), Table { columns, rows });
    }

    /// Store a large object and return its reference.
    pub fn put_lob(&self, bytes: Vec<u8>) -> LobReference {
        let mut state = self.lock();
        let id = state.next_id();
        state.lobs.insert(id, bytes);
        LobReference::new(id)
    }

    /// Fail the next call of `op` with `message`.
    pub fn fail_next(&self, op: Operation, message: &str) {
        self.lock().failures.push((op, message.to_string()));
    }

    /// Sleep before every call of `op`.
    pub fn delay(&self, op: Operation, delay: Duration) {
        self.lock().delays.insert(op, delay);
    }

    pub fn clear_delays(&self) {
        self.lock().delays.clear();
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    #[must_use]
    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.lock().events.iter().filter(|e| matches(e)).count()
    }

    #[must_use]
    pub fn last_begin_options(&self) -> Option<TransactionOptions> {
        self.lock().begin_options.last().cloned()
    }

    #[must_use]
    pub fn open_transaction_count(&self) -> usize {
        self.lock().open_transactions.len()
    }

    #[must_use]
    pub fn open_cursor_count(&self) -> usize {
        self.lock().cursors.len()
    }

    #[must_use]
    pub fn prepared_count(&self) -> usize {
        self.lock().prepared.len()
    }

    /// Apply the injected delay and failure for `op`.
    async fn enter(&self, op: Operation) -> Result<(), TransportError> {
        let delay = self.lock().delays.get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.lock().take_failure(op)
    }
}

#[async_trait]
impl SessionTransport for MemoryTransport {
    async fn begin_transaction(
        &self,
        options: &TransactionOptions,
    ) -> Result<RemoteTransaction, TransportError> {
        self.enter(Operation::Begin).await?;
        let mut state = self.lock();
        let id = state.next_id();
        state.open_transactions.insert(id, Vec::new());
        state.begin_options.push(options.clone());
        state.events.push(Event::Begin { tx: id });
        Ok(RemoteTransaction { id })
    }

    async fn commit(&self, tx: &RemoteTransaction) -> Result<(), TransportError> {
        self.enter(Operation::Commit).await?;
        let mut state = self.lock();
        let writes = std::mem::take(state.writes(tx)?);
        for write in writes {
            match write {
                Write::Insert(table, row) => {
                    if let Some(t) = state.tables.get_mut(&table) {
                        t.rows.push(row);
                    }
                }
                Write::Clear(table) => {
                    if let Some(t) = state.tables.get_mut(&table) {
                        t.rows.clear();
                    }
                }
            }
        }
        state.events.push(Event::Commit { tx: tx.id });
        Ok(())
    }

    async fn rollback(&self, tx: &RemoteTransaction) -> Result<(), TransportError> {
        self.enter(Operation::Rollback).await?;
        let mut state = self.lock();
        state.writes(tx)?.clear();
        state.events.push(Event::Rollback { tx: tx.id });
        Ok(())
    }

    async fn close_transaction(&self, tx: &RemoteTransaction) -> Result<(), TransportError> {
        self.enter(Operation::Close).await?;
        let mut state = self.lock();
        state.open_transactions.remove(&tx.id);
        state.events.push(Event::CloseTransaction { tx: tx.id });
        Ok(())
    }

    async fn prepare(
        &self,
        sql: &str,
        placeholders: &[Placeholder],
    ) -> Result<RemotePrepared, TransportError> {
        self.enter(Operation::Prepare).await?;
        let mut state = self.lock();
        let has_result_records = state.scripted.contains_key(sql)
            || matches!(shape(sql), Shape::Select(_))
            || sql.trim_start().to_ascii_lowercase().starts_with("select");
        let id = state.next_id();
        state.prepared.insert(id, sql.to_string());
        state.events.push(Event::Prepare {
            prepared: id,
            placeholders: placeholders.iter().map(|p| p.atom_type).collect(),
        });
        Ok(RemotePrepared {
            id,
            has_result_records,
        })
    }

    async fn dispose_prepared(&self, prepared: &RemotePrepared) -> Result<(), TransportError> {
        self.enter(Operation::Close).await?;
        let mut state = self.lock();
        state.prepared.remove(&prepared.id);
        state.events.push(Event::DisposePrepared {
            prepared: prepared.id,
        });
        Ok(())
    }

    async fn execute_query(
        &self,
        tx: &RemoteTransaction,
        prepared: &RemotePrepared,
        _params: &[WireParameter],
    ) -> Result<RemoteCursor, TransportError> {
        self.enter(Operation::Execute).await?;
        let mut state = self.lock();
        state.writes(tx)?;
        let sql = state
            .prepared
            .get(&prepared.id)
            .cloned()
            .ok_or_else(|| TransportError::new("unknown prepared statement"))?;
        let (columns, rows) = if let Some(table) = state.scripted.get(&sql) {
            (table.columns.clone(), table.rows.clone())
        } else if let Shape::Select(name) = shape(&sql) {
            let columns = state
                .tables
                .get(&name)
                .map(|t| t.columns.clone())
                .ok_or_else(|| TransportError::new(format!("table {name} not found")))?;
            (columns, state.visible_rows(&name, tx.id))
        } else {
            (Vec::new(), Vec::new())
        };
        let id = state.next_id();
        state.cursors.insert(
            id,
            CursorState {
                columns,
                rows: rows.into(),
            },
        );
        state.events.push(Event::ExecuteQuery {
            tx: tx.id,
            cursor: id,
        });
        Ok(RemoteCursor { id })
    }

    async fn execute_statement(
        &self,
        tx: &RemoteTransaction,
        prepared: &RemotePrepared,
        params: &[WireParameter],
    ) -> Result<u64, TransportError> {
        self.enter(Operation::Execute).await?;
        let mut state = self.lock();
        let sql = state
            .prepared
            .get(&prepared.id)
            .cloned()
            .ok_or_else(|| TransportError::new("unknown prepared statement"))?;
        let count = match shape(&sql) {
            Shape::Insert(table, literals) => {
                if !state.tables.contains_key(&table) {
                    return Err(TransportError::new(format!("table {table} not found")));
                }
                let row = match literals {
                    Some(row) if params.is_empty() => row,
                    _ => params.iter().map(|p| p.value.clone()).collect(),
                };
                state.writes(tx)?.push(Write::Insert(table, row));
                1
            }
            Shape::Delete(table) => {
                let removed = state.visible_rows(&table, tx.id).len() as u64;
                state.writes(tx)?.push(Write::Clear(table));
                removed
            }
            Shape::Select(_) | Shape::Other => {
                state.writes(tx)?;
                0
            }
        };
        state.events.push(Event::ExecuteStatement { tx: tx.id, count });
        Ok(count)
    }

    async fn describe_cursor(
        &self,
        cursor: &RemoteCursor,
    ) -> Result<Vec<ColumnMetadata>, TransportError> {
        self.enter(Operation::Fetch).await?;
        self.lock()
            .cursors
            .get(&cursor.id)
            .map(|c| c.columns.clone())
            .ok_or_else(|| TransportError::new(format!("cursor {} is not open", cursor.id)))
    }

    async fn fetch_row(
        &self,
        cursor: &RemoteCursor,
    ) -> Result<Option<Vec<WireValue>>, TransportError> {
        self.enter(Operation::Fetch).await?;
        self.lock()
            .cursors
            .get_mut(&cursor.id)
            .map(|c| c.rows.pop_front())
            .ok_or_else(|| TransportError::new(format!("cursor {} is not open", cursor.id)))
    }

    async fn close_cursor(&self, cursor: &RemoteCursor) -> Result<(), TransportError> {
        self.enter(Operation::Close).await?;
        let mut state = self.lock();
        state.cursors.remove(&cursor.id);
        state.events.push(Event::CloseCursor { cursor: cursor.id });
        Ok(())
    }

    async fn read_lob(&self, lob: &LobReference) -> Result<Vec<u8>, TransportError> {
        self.enter(Operation::Fetch).await?;
        self.lock()
            .lobs
            .get(&lob.id)
            .cloned()
            .ok_or_else(|| TransportError::new(format!("large object {} not found", lob.id)))
    }
}

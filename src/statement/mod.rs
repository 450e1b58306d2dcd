//! Statement execution.
//!
//! [`Statement`] runs ad-hoc SQL text, [`PreparedStatement`] binds positional
//! parameters. Both go through the connection's transaction coordinator, so the
//! first statement after a commit begins a new transaction.

mod executor;
mod prepared;

use std::sync::Arc;
use std::time::Duration;

pub(crate) use executor::StatementExecutor;
pub use prepared::PreparedStatement;

use crate::connection::Shared;
use crate::cursor::ResultCursor;
use crate::error::{DriverError, Result};

/// Result of [`Statement::execute`] and [`PreparedStatement::execute`].
#[derive(Debug)]
pub enum ExecuteOutcome {
    Rows(ResultCursor),
    Updated(u64),
}

impl ExecuteOutcome {
    #[must_use]
    pub fn update_count(&self) -> Option<u64> {
        match self {
            ExecuteOutcome::Updated(count) => Some(*count),
            ExecuteOutcome::Rows(_) => None,
        }
    }

    #[must_use]
    pub fn into_cursor(self) -> Option<ResultCursor> {
        match self {
            ExecuteOutcome::Rows(cursor) => Some(cursor),
            ExecuteOutcome::Updated(_) => None,
        }
    }
}

/// Statement for SQL text without parameters.
#[derive(Debug)]
pub struct Statement {
    shared: Arc<Shared>,
    batch: Vec<String>,
    max_rows: Option<usize>,
    query_timeout: Option<Duration>,
    closed: bool,
}

impl Statement {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            batch: Vec::new(),
            max_rows: None,
            query_timeout: None,
            closed: false,
        }
    }

    fn executor(&self) -> Result<StatementExecutor<'_>> {
        if self.closed {
            return Err(DriverError::Closed("statement is closed".into()));
        }
        self.shared.ensure_open()?;
        Ok(StatementExecutor::new(
            &self.shared,
            self.max_rows,
            self.query_timeout,
        ))
    }

    /// Run a query and return its cursor.
    ///
    /// # Errors
    /// Returns `DriverError::Execution` if `sql` produces no records, or any
    /// prepare/begin/execute failure.
    pub fn execute_query(&mut self, sql: &str) -> Result<ResultCursor> {
        let executor = self.executor()?;
        let prepared = executor.prepare(sql, &[])?;
        if !prepared.has_result_records {
            executor.dispose(&prepared);
            return Err(DriverError::Execution(
                "statement does not return a result set".into(),
            ));
        }
        executor.query(&prepared, true, &[])
    }

    /// Run a statement that returns no records.
    ///
    /// Under autocommit the transaction is committed before this returns, or rolled
    /// back if the statement fails.
    ///
    /// # Errors
    /// Returns `DriverError::Execution` if `sql` returns records, or any
    /// prepare/begin/execute/commit failure.
    pub fn execute_update(&mut self, sql: &str) -> Result<u64> {
        let executor = self.executor()?;
        executor.in_transaction(|executor, handle| {
            let prepared = executor.prepare(sql, &[])?;
            let outcome = if prepared.has_result_records {
                Err(DriverError::Execution(
                    "statement returns a result set; use execute_query".into(),
                ))
            } else {
                executor.execute_statement(handle, &prepared, &[])
            };
            executor.dispose(&prepared);
            outcome
        })
    }

    /// Run either kind of statement.
    ///
    /// # Errors
    /// Any prepare/begin/execute/commit failure.
    pub fn execute(&mut self, sql: &str) -> Result<ExecuteOutcome> {
        let executor = self.executor()?;
        let prepared = executor.prepare(sql, &[])?;
        if prepared.has_result_records {
            return executor
                .query(&prepared, true, &[])
                .map(ExecuteOutcome::Rows);
        }
        let outcome = executor.in_transaction(|executor, handle| {
            executor.execute_statement(handle, &prepared, &[])
        });
        executor.dispose(&prepared);
        outcome.map(ExecuteOutcome::Updated)
    }

    pub fn add_batch(&mut self, sql: impl Into<String>) {
        self.batch.push(sql.into());
    }

    pub fn clear_batch(&mut self) {
        self.batch.clear();
    }

    /// Run every queued statement in one transaction and return their update counts.
    ///
    /// The queue is emptied whether or not the batch succeeds.
    ///
    /// # Errors
    /// The first failing statement's error; under autocommit nothing is committed.
    pub fn execute_batch(&mut self) -> Result<Vec<u64>> {
        let batch = std::mem::take(&mut self.batch);
        let executor = self.executor()?;
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        executor.in_transaction(|executor, handle| {
            let mut counts = Vec::with_capacity(batch.len());
            for sql in &batch {
                let prepared = executor.prepare(sql, &[])?;
                let count = executor.execute_statement(handle, &prepared, &[]);
                executor.dispose(&prepared);
                counts.push(count?);
            }
            Ok(counts)
        })
    }

    /// Cap on the rows any cursor from this statement returns.
    pub fn set_max_rows(&mut self, max_rows: Option<usize>) {
        self.max_rows = max_rows;
    }

    /// Timeout for prepare, execute and fetch calls of this statement.
    pub fn set_query_timeout(&mut self, timeout: Option<Duration>) {
        self.query_timeout = timeout;
    }

    pub fn close(&mut self) {
        self.batch.clear();
        self.closed = true;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

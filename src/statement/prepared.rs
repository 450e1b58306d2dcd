use std::sync::Arc;
use std::time::Duration;

use super::{ExecuteOutcome, StatementExecutor};
use crate::connection::Shared;
use crate::conversion::ConversionContext;
use crate::cursor::ResultCursor;
use crate::error::{DriverError, Result};
use crate::params::{ParameterBindings, ParameterEncoder};
use crate::transport::{Placeholder, RemotePrepared, WireParameter};
use crate::types::{AtomType, HostValue};

/// Statement with positional parameters, prepared on the server on first execution.
///
/// Binding a value whose wire type differs from the one a position was prepared
/// with disposes the server-side statement and prepares it again.
#[derive(Debug)]
pub struct PreparedStatement {
    shared: Arc<Shared>,
    sql: String,
    remote: Option<RemotePrepared>,
    bindings: ParameterBindings,
    encoder: ParameterEncoder,
    batch: Vec<Vec<WireParameter>>,
    batch_placeholders: Option<Vec<Placeholder>>,
    max_rows: Option<usize>,
    query_timeout: Option<Duration>,
    closed: bool,
}

impl PreparedStatement {
    pub(crate) fn new(shared: Arc<Shared>, sql: String) -> Self {
        let encoder = ParameterEncoder::new(ConversionContext::new(shared.conversion));
        Self {
            shared,
            sql,
            remote: None,
            bindings: ParameterBindings::new(),
            encoder,
            batch: Vec::new(),
            batch_placeholders: None,
            max_rows: None,
            query_timeout: None,
            closed: false,
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DriverError::Closed("prepared statement is closed".into()));
        }
        self.shared.ensure_open()
    }

    /// Bind `value` at 1-based `index`, inferring its wire type.
    ///
    /// # Errors
    /// Returns `DriverError::Parameter` for index 0, or for a null at a position
    /// that has no type yet.
    pub fn set(&mut self, index: usize, value: impl Into<HostValue>) -> Result<()> {
        self.ensure_open()?;
        self.bindings.bind(index, value.into(), None)
    }

    /// Bind `value` at `index` as `atom_type`.
    ///
    /// # Errors
    /// Returns `DriverError::Parameter` for index 0.
    pub fn set_typed(
        &mut self,
        index: usize,
        value: impl Into<HostValue>,
        atom_type: AtomType,
    ) -> Result<()> {
        self.ensure_open()?;
        self.bindings.bind(index, value.into(), Some(atom_type))
    }

    /// # Errors
    /// Returns `DriverError::Parameter` for index 0.
    pub fn set_null(&mut self, index: usize, atom_type: AtomType) -> Result<()> {
        self.set_typed(index, HostValue::Null, atom_type)
    }

    /// Drop bound values; positions keep their wire types.
    pub fn clear_parameters(&mut self) {
        self.bindings.clear();
    }

    fn executor(&self) -> StatementExecutor<'_> {
        StatementExecutor::new(&self.shared, self.max_rows, self.query_timeout)
    }

    /// Server-side statement matching the current placeholders.
    fn ensure_prepared(&mut self) -> Result<RemotePrepared> {
        let changed = self.bindings.take_changed();
        if let Some(remote) = &self.remote
            && !changed
        {
            return Ok(remote.clone());
        }
        let placeholders = self.bindings.placeholders()?;
        let stale = self.remote.take();
        let executor = self.executor();
        if let Some(stale) = stale {
            tracing::debug!(prepared = stale.id, "re-preparing after placeholder change");
            executor.dispose(&stale);
        }
        let prepared = executor.prepare(&self.sql, &placeholders)?;
        self.remote = Some(prepared.clone());
        Ok(prepared)
    }

    fn bound_parameters(&self) -> Result<Vec<WireParameter>> {
        self.bindings.encode(&self.encoder)
    }

    /// # Errors
    /// Returns `DriverError::Execution` if the statement produces no records, a
    /// parameter error, or any prepare/begin/execute failure.
    pub fn execute_query(&mut self) -> Result<ResultCursor> {
        self.ensure_open()?;
        let params = self.bound_parameters()?;
        let prepared = self.ensure_prepared()?;
        if !prepared.has_result_records {
            return Err(DriverError::Execution(
                "statement does not return a result set".into(),
            ));
        }
        self.executor().query(&prepared, false, &params)
    }

    /// # Errors
    /// Returns `DriverError::Execution` if the statement returns records, a
    /// parameter error, or any prepare/begin/execute/commit failure.
    pub fn execute_update(&mut self) -> Result<u64> {
        self.ensure_open()?;
        let params = self.bound_parameters()?;
        let prepared = self.ensure_prepared()?;
        if prepared.has_result_records {
            return Err(DriverError::Execution(
                "statement returns a result set; use execute_query".into(),
            ));
        }
        self.executor().in_transaction(|executor, handle| {
            executor.execute_statement(handle, &prepared, &params)
        })
    }

    /// # Errors
    /// A parameter error or any prepare/begin/execute/commit failure.
    pub fn execute(&mut self) -> Result<ExecuteOutcome> {
        self.ensure_open()?;
        let params = self.bound_parameters()?;
        let prepared = self.ensure_prepared()?;
        let executor = self.executor();
        if prepared.has_result_records {
            executor
                .query(&prepared, false, &params)
                .map(ExecuteOutcome::Rows)
        } else {
            executor
                .in_transaction(|executor, handle| {
                    executor.execute_statement(handle, &prepared, &params)
                })
                .map(ExecuteOutcome::Updated)
        }
    }

    /// Queue the current bindings.
    ///
    /// # Errors
    /// Returns `DriverError::Parameter` if a position is unset or the wire types differ
    /// from the entries already queued.
    pub fn add_batch(&mut self) -> Result<()> {
        self.ensure_open()?;
        let placeholders = self.bindings.placeholders()?;
        match &self.batch_placeholders {
            Some(queued) if *queued != placeholders => {
                return Err(DriverError::Parameter(
                    "batch entries must bind the same parameter types".into(),
                ));
            }
            Some(_) => {}
            None => self.batch_placeholders = Some(placeholders),
        }
        let params = self.bound_parameters()?;
        self.batch.push(params);
        Ok(())
    }

    pub fn clear_batch(&mut self) {
        self.batch.clear();
        self.batch_placeholders = None;
    }

    /// Run every queued entry in one transaction.
    ///
    /// # Errors
    /// The first failing entry's error; under autocommit nothing is committed.
    pub fn execute_batch(&mut self) -> Result<Vec<u64>> {
        self.ensure_open()?;
        let batch = std::mem::take(&mut self.batch);
        let Some(queued) = self.batch_placeholders.take() else {
            return Ok(Vec::new());
        };
        if self.bindings.placeholders()? != queued {
            return Err(DriverError::Parameter(
                "parameter types changed after entries were queued".into(),
            ));
        }
        let prepared = self.ensure_prepared()?;
        self.executor().in_transaction(|executor, handle| {
            batch
                .iter()
                .map(|params| executor.execute_statement(handle, &prepared, params))
                .collect()
        })
    }

    pub fn set_max_rows(&mut self, max_rows: Option<usize>) {
        self.max_rows = max_rows;
    }

    pub fn set_query_timeout(&mut self, timeout: Option<Duration>) {
        self.query_timeout = timeout;
    }

    /// Dispose the server-side statement. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.batch.clear();
        if let Some(remote) = self.remote.take() {
            self.executor().dispose(&remote);
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for PreparedStatement {
    fn drop(&mut self) {
        self.close();
    }
}

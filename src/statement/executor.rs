use std::time::Duration;

use crate::config::Operation;
use crate::connection::Shared;
use crate::cursor::ResultCursor;
use crate::error::Result;
use crate::transaction::TransactionHandle;
use crate::transport::{Placeholder, RemotePrepared, WireParameter};

/// Runs statements against the connection's current transaction.
///
/// Work that ends without a cursor finishes the transaction itself: an
/// autocommit handle commits on success and rolls back on failure.
pub(crate) struct StatementExecutor<'a> {
    shared: &'a Shared,
    max_rows: Option<usize>,
    timeout: Option<Duration>,
}

impl<'a> StatementExecutor<'a> {
    pub(crate) fn new(shared: &'a Shared, max_rows: Option<usize>, timeout: Option<Duration>) -> Self {
        Self {
            shared,
            max_rows: max_rows.or(shared.max_rows),
            timeout,
        }
    }

    pub(crate) fn prepare(&self, sql: &str, placeholders: &[Placeholder]) -> Result<RemotePrepared> {
        let session = &self.shared.session;
        let prepared = session.call(
            Operation::Prepare,
            self.timeout,
            session.transport().prepare(sql, placeholders),
        )?;
        tracing::trace!(prepared = prepared.id, sql, "prepared");
        Ok(prepared)
    }

    /// Best-effort release of a server-side prepared statement.
    pub(crate) fn dispose(&self, prepared: &RemotePrepared) {
        let session = &self.shared.session;
        if let Err(e) = session.call(
            Operation::Close,
            None,
            session.transport().dispose_prepared(prepared),
        ) {
            tracing::warn!(prepared = prepared.id, error = %e, "failed to dispose prepared statement");
        }
    }

    /// Open a cursor. With `owned`, the cursor disposes `prepared` when it closes.
    pub(crate) fn query(
        &self,
        prepared: &RemotePrepared,
        owned: bool,
        params: &[WireParameter],
    ) -> Result<ResultCursor> {
        let handle = match self.shared.coordinator.get_or_begin_transaction() {
            Ok(handle) => handle,
            Err(e) => {
                if owned {
                    self.dispose(prepared);
                }
                return Err(e);
            }
        };
        let session = &self.shared.session;
        let opened = session.call(
            Operation::Execute,
            self.timeout,
            session
                .transport()
                .execute_query(handle.remote(), prepared, params),
        );
        match opened {
            Ok(remote) => Ok(ResultCursor::open(
                handle,
                remote,
                owned.then(|| prepared.clone()),
                self.shared.conversion,
                self.max_rows,
                self.timeout,
            )),
            Err(e) => {
                if owned {
                    self.dispose(prepared);
                }
                handle.abort_after(&e);
                Err(e)
            }
        }
    }

    /// Run `work` inside the current transaction and finish it.
    pub(crate) fn in_transaction<T>(
        &self,
        work: impl FnOnce(&Self, &TransactionHandle) -> Result<T>,
    ) -> Result<T> {
        let handle = self.shared.coordinator.get_or_begin_transaction()?;
        match work(self, &handle) {
            Ok(value) => {
                handle.finish()?;
                Ok(value)
            }
            Err(e) => {
                handle.abort_after(&e);
                Err(e)
            }
        }
    }

    pub(crate) fn execute_statement(
        &self,
        handle: &TransactionHandle,
        prepared: &RemotePrepared,
        params: &[WireParameter],
    ) -> Result<u64> {
        let session = &self.shared.session;
        session.call(
            Operation::Execute,
            self.timeout,
            session
                .transport()
                .execute_statement(handle.remote(), prepared, params),
        )
    }
}

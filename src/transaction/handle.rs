use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Operation;
use crate::error::{DriverError, Result};
use crate::session::Session;
use crate::transport::RemoteTransaction;

/// One remote transaction.
///
/// The `autocommit` flag is fixed when the handle is created. The first of
/// `commit`, `rollback` or `close` to run claims the handle; every later call is a
/// no-op, so a cursor finishing and the connection committing cannot both reach
/// the server.
pub struct TransactionHandle {
    session: Arc<Session>,
    remote: RemoteTransaction,
    autocommit: bool,
    closed: AtomicBool,
}

impl TransactionHandle {
    pub(crate) fn new(session: Arc<Session>, remote: RemoteTransaction, autocommit: bool) -> Self {
        Self {
            session,
            remote,
            autocommit,
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_autocommit(&self) -> bool {
        self.autocommit
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn remote(&self) -> &RemoteTransaction {
        &self.remote
    }

    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Returns false if the handle was already claimed.
    fn claim(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Commit and release the remote transaction.
    ///
    /// # Errors
    /// Returns `DriverError::Commit` or `DriverError::Timeout`. The handle is closed either way.
    pub fn commit(&self) -> Result<()> {
        if !self.claim() {
            return Ok(());
        }
        tracing::debug!(tx = self.remote.id, "commit");
        let outcome = self.session.call(
            Operation::Commit,
            None,
            self.session.transport().commit(&self.remote),
        );
        self.release();
        outcome
    }

    /// Roll back and release the remote transaction.
    ///
    /// # Errors
    /// Returns `DriverError::Rollback` or `DriverError::Timeout`. The handle is closed either way.
    pub fn rollback(&self) -> Result<()> {
        if !self.claim() {
            return Ok(());
        }
        tracing::debug!(tx = self.remote.id, "rollback");
        let outcome = self.session.call(
            Operation::Rollback,
            None,
            self.session.transport().rollback(&self.remote),
        );
        self.release();
        outcome
    }

    /// Commit if this is an autocommit handle. Cursors and statements end their
    /// work through here; they never commit or roll back directly.
    ///
    /// # Errors
    /// Same as [`commit`](Self::commit).
    pub fn finish(&self) -> Result<()> {
        if self.autocommit && !self.is_closed() {
            tracing::trace!(tx = self.remote.id, "autocommit finish");
            self.commit()
        } else {
            Ok(())
        }
    }

    /// Roll back after a failed statement: always under autocommit, and in manual
    /// mode when the call timed out, since the remote state is then unknown.
    pub(crate) fn abort_after(&self, failure: &DriverError) {
        let timed_out = matches!(failure, DriverError::Timeout { .. });
        if (self.autocommit || timed_out)
            && let Err(e) = self.rollback()
        {
            tracing::warn!(tx = self.remote.id, error = %e, "rollback after failed statement");
        }
    }

    fn release(&self) {
        if let Err(e) = self.session.call(
            Operation::Close,
            None,
            self.session.transport().close_transaction(&self.remote),
        ) {
            tracing::warn!(tx = self.remote.id, error = %e, "failed to release transaction");
        }
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("remote", &self.remote)
            .field("autocommit", &self.autocommit)
            .field("closed", &self.is_closed())
            .finish()
    }
}

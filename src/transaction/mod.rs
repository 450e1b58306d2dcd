//! Connection-scoped transaction lifecycle.
//!
//! A connection holds at most one [`TransactionHandle`]. The
//! [`TransactionCoordinator`] begins it lazily on the first statement, hands it
//! to statements and cursors, and clears its slot on commit, rollback or close.
//! Cursors may close the handle behind the coordinator's back (autocommit
//! finish), so every accessor first checks the held handle and drops it if it
//! is already closed.

mod handle;
mod options;

use std::sync::{Arc, Mutex, MutexGuard};

pub use handle::TransactionHandle;
pub use options::{TransactionOptions, TransactionPriority, TransactionType};

use crate::config::{Operation, TransactionSettings};
use crate::error::{DriverError, NoTransactionReason, Result};
use crate::session::Session;

#[derive(Debug)]
struct Slot {
    active: Option<Arc<TransactionHandle>>,
    autocommit: bool,
    settings: TransactionSettings,
}

impl Slot {
    /// Held handle, unless it has been closed since it was stored.
    fn live(&mut self) -> Option<&Arc<TransactionHandle>> {
        if self.active.as_ref().is_some_and(|h| h.is_closed())
            && let Some(stale) = self.active.take()
        {
            tracing::trace!(tx = stale.remote().id, "dropping closed transaction");
        }
        self.active.as_ref()
    }

    fn no_transaction_reason(&self) -> NoTransactionReason {
        if self.autocommit {
            NoTransactionReason::AutoCommitEnabled
        } else {
            NoTransactionReason::NoStatementExecuted
        }
    }
}

/// Owns the single transaction slot of a connection.
#[derive(Debug)]
pub struct TransactionCoordinator {
    session: Arc<Session>,
    slot: Mutex<Slot>,
}

impl TransactionCoordinator {
    pub(crate) fn new(
        session: Arc<Session>,
        autocommit: bool,
        settings: TransactionSettings,
    ) -> Self {
        Self {
            session,
            slot: Mutex::new(Slot {
                active: None,
                autocommit,
                settings,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The live transaction, beginning one if there is none.
    ///
    /// The new handle's autocommit flag is the connection's setting at this moment.
    ///
    /// # Errors
    /// Returns `DriverError::TransactionBegin` if the server refuses. An elapsed begin
    /// timeout is reported as `DriverError::Timeout { operation: "begin", .. }`, not as
    /// `TransactionBegin`, so callers can tell the two apart. The slot stays empty.
    pub fn get_or_begin_transaction(&self) -> Result<Arc<TransactionHandle>> {
        let mut slot = self.lock();
        if let Some(handle) = slot.live() {
            return Ok(Arc::clone(handle));
        }

        let autocommit = slot.autocommit;
        let options = slot.settings.options().clone();
        if tracing::enabled!(tracing::Level::DEBUG) {
            let rendered = serde_json::to_string(&options).unwrap_or_default();
            tracing::debug!(autocommit, options = %rendered, "begin transaction");
        }
        let remote = self.session.call(
            Operation::Begin,
            None,
            self.session.transport().begin_transaction(&options),
        )?;
        let handle = Arc::new(TransactionHandle::new(
            Arc::clone(&self.session),
            remote,
            autocommit,
        ));
        slot.active = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// The live transaction, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<TransactionHandle>> {
        self.lock().live().cloned()
    }

    /// # Errors
    /// Returns `DriverError::NoActiveTransaction` if no transaction is live.
    pub fn require_active_transaction(&self) -> Result<Arc<TransactionHandle>> {
        let mut slot = self.lock();
        if let Some(handle) = slot.live() {
            return Ok(Arc::clone(handle));
        }
        Err(DriverError::NoActiveTransaction {
            reason: slot.no_transaction_reason(),
        })
    }

    /// # Errors
    /// Returns `DriverError::TransactionAlreadyActive` if a transaction is live.
    pub fn require_no_active_transaction(&self) -> Result<()> {
        match self.lock().live() {
            Some(_) => Err(DriverError::TransactionAlreadyActive),
            None => Ok(()),
        }
    }

    /// Commit the live transaction.
    ///
    /// Without a live transaction this is a no-op in manual mode. The slot is
    /// cleared whether or not the commit succeeds.
    ///
    /// # Errors
    /// Returns `DriverError::NoActiveTransaction` in autocommit mode unless a manual
    /// transaction is still live, otherwise the commit failure.
    pub fn commit(&self) -> Result<()> {
        let Some(handle) = self.take_for_completion()? else {
            tracing::debug!("commit without a transaction");
            return Ok(());
        };
        handle.commit()
    }

    /// Roll back the live transaction. Same slot rules as [`commit`](Self::commit).
    ///
    /// # Errors
    /// Returns `DriverError::NoActiveTransaction` in autocommit mode, otherwise the
    /// rollback failure.
    pub fn rollback(&self) -> Result<()> {
        let Some(handle) = self.take_for_completion()? else {
            tracing::debug!("rollback without a transaction");
            return Ok(());
        };
        handle.rollback()
    }

    /// A manual transaction left over from before autocommit was switched on can
    /// still be completed explicitly.
    fn take_for_completion(&self) -> Result<Option<Arc<TransactionHandle>>> {
        let mut slot = self.lock();
        let live_manual = slot.live().is_some_and(|h| !h.is_autocommit());
        if slot.autocommit && !live_manual {
            return Err(DriverError::NoActiveTransaction {
                reason: NoTransactionReason::AutoCommitEnabled,
            });
        }
        Ok(slot.active.take())
    }

    /// Roll back and release any live transaction. Used on connection close.
    ///
    /// # Errors
    /// Returns the rollback failure; the slot is empty afterwards regardless.
    pub fn close(&self) -> Result<()> {
        let handle = {
            let mut slot = self.lock();
            slot.live();
            slot.active.take()
        };
        match handle {
            Some(handle) => handle.rollback(),
            None => Ok(()),
        }
    }

    /// Takes effect for the next transaction; a live one keeps its own flag.
    pub fn set_autocommit(&self, autocommit: bool) {
        self.lock().autocommit = autocommit;
    }

    #[must_use]
    pub fn autocommit(&self) -> bool {
        self.lock().autocommit
    }

    #[must_use]
    pub fn transaction_settings(&self) -> TransactionSettings {
        self.lock().settings.clone()
    }

    /// Change transaction properties for the next begin.
    pub fn update_transaction_settings<R>(
        &self,
        update: impl FnOnce(&mut TransactionSettings) -> R,
    ) -> R {
        update(&mut self.lock().settings)
    }
}

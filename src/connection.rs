use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;

use crate::config::{ConnectionConfig, TransactionSettings};
use crate::conversion::ConversionSettings;
use crate::error::{DriverError, Result};
use crate::runtime::Blocker;
use crate::session::Session;
use crate::statement::{PreparedStatement, Statement};
use crate::transaction::{TransactionCoordinator, TransactionHandle};
use crate::transport::SessionTransport;

/// State shared by a connection and the statements it creates.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) session: Arc<Session>,
    pub(crate) coordinator: TransactionCoordinator,
    pub(crate) conversion: ConversionSettings,
    pub(crate) max_rows: Option<usize>,
    closed: AtomicBool,
}

impl Shared {
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DriverError::Closed("connection is closed".into()));
        }
        Ok(())
    }
}

/// Blocking connection over a [`SessionTransport`].
///
/// Every call blocks the calling thread until the transport answers or the
/// configured timeout elapses. The connection begins a transaction when the first
/// statement runs; in autocommit mode that transaction ends with the statement.
#[derive(Debug)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Open a connection driven by its own runtime.
    ///
    /// # Errors
    /// Returns `DriverError::Config` if the runtime cannot be created.
    pub fn open(transport: Arc<dyn SessionTransport>, config: ConnectionConfig) -> Result<Self> {
        Ok(Self::with_blocker(transport, config, Blocker::new()?))
    }

    /// Open a connection that drives the transport on an existing multi-thread runtime.
    ///
    /// # Errors
    /// Returns `DriverError::Config` if `handle` belongs to a current-thread runtime.
    pub fn open_on(
        transport: Arc<dyn SessionTransport>,
        config: ConnectionConfig,
        handle: Handle,
    ) -> Result<Self> {
        Ok(Self::with_blocker(
            transport,
            config,
            Blocker::from_handle(handle)?,
        ))
    }

    fn with_blocker(
        transport: Arc<dyn SessionTransport>,
        config: ConnectionConfig,
        blocker: Blocker,
    ) -> Self {
        let session = Arc::new(Session::new(transport, blocker, config.timeouts));
        let coordinator = TransactionCoordinator::new(
            Arc::clone(&session),
            config.autocommit,
            config.transaction,
        );
        tracing::debug!(autocommit = config.autocommit, "connection opened");
        Self {
            shared: Arc::new(Shared {
                session,
                coordinator,
                conversion: config.conversion,
                max_rows: config.max_rows,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// # Errors
    /// Returns `DriverError::Closed` if the connection is closed.
    pub fn create_statement(&self) -> Result<Statement> {
        self.shared.ensure_open()?;
        Ok(Statement::new(Arc::clone(&self.shared)))
    }

    /// The statement is prepared on the server when it first executes.
    ///
    /// # Errors
    /// Returns `DriverError::Closed` if the connection is closed.
    pub fn prepare_statement(&self, sql: impl Into<String>) -> Result<PreparedStatement> {
        self.shared.ensure_open()?;
        Ok(PreparedStatement::new(Arc::clone(&self.shared), sql.into()))
    }

    /// Applies from the next transaction on.
    pub fn set_autocommit(&self, autocommit: bool) {
        self.shared.coordinator.set_autocommit(autocommit);
    }

    #[must_use]
    pub fn autocommit(&self) -> bool {
        self.shared.coordinator.autocommit()
    }

    /// # Errors
    /// Returns `DriverError::NoActiveTransaction` in autocommit mode, or the commit failure.
    pub fn commit(&self) -> Result<()> {
        self.shared.ensure_open()?;
        self.shared.coordinator.commit()
    }

    /// # Errors
    /// Returns `DriverError::NoActiveTransaction` in autocommit mode, or the rollback failure.
    pub fn rollback(&self) -> Result<()> {
        self.shared.ensure_open()?;
        self.shared.coordinator.rollback()
    }

    /// The live transaction, beginning one if needed.
    ///
    /// # Errors
    /// Returns the begin failure.
    pub fn transaction(&self) -> Result<Arc<TransactionHandle>> {
        self.shared.ensure_open()?;
        self.shared.coordinator.get_or_begin_transaction()
    }

    #[must_use]
    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.shared.coordinator
    }

    #[must_use]
    pub fn transaction_settings(&self) -> TransactionSettings {
        self.shared.coordinator.transaction_settings()
    }

    pub fn update_transaction_settings<R>(
        &self,
        update: impl FnOnce(&mut TransactionSettings) -> R,
    ) -> R {
        self.shared.coordinator.update_transaction_settings(update)
    }

    /// Roll back and release any live transaction. Idempotent.
    ///
    /// # Errors
    /// Returns the rollback failure; the connection is closed regardless.
    pub fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!("connection close");
        self.shared.coordinator.close()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close dropped connection");
        }
    }
}

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Operation, Timeouts};
use crate::error::{DriverError, Result};
use crate::runtime::Blocker;
use crate::transport::{SessionTransport, TransportError};

/// Transport plus the runtime that drives it, shared by everything a connection opens.
pub(crate) struct Session {
    transport: Arc<dyn SessionTransport>,
    blocker: Blocker,
    timeouts: Timeouts,
}

impl Session {
    pub(crate) fn new(
        transport: Arc<dyn SessionTransport>,
        blocker: Blocker,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            transport,
            blocker,
            timeouts,
        }
    }

    pub(crate) fn transport(&self) -> &dyn SessionTransport {
        self.transport.as_ref()
    }

    /// Block on a transport call.
    ///
    /// `timeout` overrides the configured timeout for `op`. Transport failures are
    /// classified by operation.
    pub(crate) fn call<T, F>(&self, op: Operation, timeout: Option<Duration>, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, TransportError>> + Send,
        T: Send,
    {
        let timeout = timeout.or_else(|| self.timeouts.resolve(op));
        self.blocker.run(op.as_str(), timeout, async move {
            fut.await.map_err(|e| classify(op, e))
        })
    }
}

fn classify(op: Operation, err: TransportError) -> DriverError {
    match op {
        Operation::Begin => DriverError::TransactionBegin(err.to_string()),
        Operation::Commit => DriverError::Commit(err.to_string()),
        Operation::Rollback => DriverError::Rollback(err.to_string()),
        Operation::Prepare | Operation::Execute | Operation::Fetch => {
            DriverError::Execution(err.to_string())
        }
        Operation::Close => DriverError::Transport(err),
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("blocker", &self.blocker)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

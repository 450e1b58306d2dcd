use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;
use crate::types::{AtomType, TargetKind};

/// Result alias used throughout the driver.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Why there is no transaction to commit or roll back.
///
/// Both causes look the same to the coordinator's state machine, but callers
/// get different diagnostics for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoTransactionReason {
    /// The connection is in auto-commit mode, so explicit commit/rollback is refused.
    AutoCommitEnabled,
    /// No statement has been executed since the last transaction ended.
    NoStatementExecuted,
}

impl fmt::Display for NoTransactionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoTransactionReason::AutoCommitEnabled => f.write_str("auto-commit is enabled"),
            NoTransactionReason::NoStatementExecuted => {
                f.write_str("no statement has been executed")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to begin transaction: {0}")]
    TransactionBegin(String),

    #[error("no active transaction: {reason}")]
    NoActiveTransaction { reason: NoTransactionReason },

    #[error("a transaction is already active")]
    TransactionAlreadyActive,

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("rollback failed: {0}")]
    Rollback(String),

    #[error("unsupported conversion from {from} to {target:?}")]
    UnsupportedConversion { from: AtomType, target: TargetKind },

    #[error("value out of range for {target:?}: {message}")]
    OutOfRangeConversion { target: TargetKind, message: String },

    #[error("malformed literal {literal:?} for {target:?}: {message}")]
    MalformedLiteralConversion {
        target: TargetKind,
        literal: String,
        message: String,
    },

    #[error("invalid column index {index} (column count {column_count})")]
    InvalidColumnIndex { index: usize, column_count: usize },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("SQL execution error: {0}")]
    Execution(String),

    #[error("Parameter error: {0}")]
    Parameter(String),

    #[error("closed: {0}")]
    Closed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DriverError {
    pub(crate) fn unsupported(from: AtomType, target: TargetKind) -> Self {
        DriverError::UnsupportedConversion { from, target }
    }

    pub(crate) fn out_of_range(target: TargetKind, message: impl Into<String>) -> Self {
        DriverError::OutOfRangeConversion {
            target,
            message: message.into(),
        }
    }

    pub(crate) fn malformed(
        target: TargetKind,
        literal: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        DriverError::MalformedLiteralConversion {
            target,
            literal: literal.into(),
            message: message.to_string(),
        }
    }

    /// True for the three classified conversion failures.
    #[must_use]
    pub fn is_conversion_error(&self) -> bool {
        matches!(
            self,
            DriverError::UnsupportedConversion { .. }
                | DriverError::OutOfRangeConversion { .. }
                | DriverError::MalformedLiteralConversion { .. }
        )
    }
}

//! Interface to the asynchronous session client.
//!
//! The driver never frames bytes itself; everything that reaches the remote
//! database goes through a [`SessionTransport`]. Every method returns a future
//! that the blocking layer awaits under a timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::TransactionOptions;
use crate::types::{AtomType, ColumnMetadata, LobReference, WireValue};

/// Error reported by the transport collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}{}", code.as_ref().map(|c| format!(" ({c})")).unwrap_or_default())]
pub struct TransportError {
    pub message: String,
    pub code: Option<String>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Opaque handle to a remote transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteTransaction {
    pub id: u64,
}

/// Opaque handle to a server-side prepared statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemotePrepared {
    pub id: u64,
    /// Whether executing the statement produces result records.
    pub has_result_records: bool,
}

/// Opaque handle to an open remote result cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteCursor {
    pub id: u64,
}

/// Declared placeholder of a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placeholder {
    pub name: String,
    pub atom_type: AtomType,
}

/// A bound parameter as sent to the session.
#[derive(Debug, Clone, PartialEq)]
pub struct WireParameter {
    pub name: String,
    pub atom_type: AtomType,
    pub value: WireValue,
}

impl WireParameter {
    /// Typed null parameter.
    #[must_use]
    pub fn null(name: impl Into<String>, atom_type: AtomType) -> Self {
        Self {
            name: name.into(),
            atom_type,
            value: WireValue::Null,
        }
    }
}

#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn begin_transaction(
        &self,
        options: &TransactionOptions,
    ) -> Result<RemoteTransaction, TransportError>;

    async fn commit(&self, tx: &RemoteTransaction) -> Result<(), TransportError>;

    async fn rollback(&self, tx: &RemoteTransaction) -> Result<(), TransportError>;

    /// Release the remote transaction resource. Called after commit/rollback and on
    /// connection close.
    async fn close_transaction(&self, tx: &RemoteTransaction) -> Result<(), TransportError>;

    async fn prepare(
        &self,
        sql: &str,
        placeholders: &[Placeholder],
    ) -> Result<RemotePrepared, TransportError>;

    async fn dispose_prepared(&self, prepared: &RemotePrepared) -> Result<(), TransportError>;

    async fn execute_query(
        &self,
        tx: &RemoteTransaction,
        prepared: &RemotePrepared,
        params: &[WireParameter],
    ) -> Result<RemoteCursor, TransportError>;

    /// Execute a statement that produces no records and return its update count.
    async fn execute_statement(
        &self,
        tx: &RemoteTransaction,
        prepared: &RemotePrepared,
        params: &[WireParameter],
    ) -> Result<u64, TransportError>;

    async fn describe_cursor(
        &self,
        cursor: &RemoteCursor,
    ) -> Result<Vec<ColumnMetadata>, TransportError>;

    /// Next row of the cursor, `None` once exhausted.
    async fn fetch_row(&self, cursor: &RemoteCursor)
    -> Result<Option<Vec<WireValue>>, TransportError>;

    async fn close_cursor(&self, cursor: &RemoteCursor) -> Result<(), TransportError>;

    async fn read_lob(&self, lob: &LobReference) -> Result<Vec<u8>, TransportError>;
}

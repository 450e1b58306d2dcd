//! Blocking, cursor-based driver over an asynchronous transactional session.
//!
//! A [`Connection`] turns the future-returning [`SessionTransport`] into
//! synchronous calls. Transactions begin lazily on the first statement and, in
//! autocommit mode, end when the statement's cursor is exhausted or closed.
//! Cell values are converted on demand by the [`conversion`] engine.

pub mod config;
pub mod connection;
pub mod conversion;
pub mod cursor;
pub mod error;
pub mod params;
pub mod prelude;
pub mod runtime;
mod session;
pub mod statement;
pub mod transaction;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{ConnectionConfig, ConnectionConfigBuilder, Timeouts, TransactionSettings};
pub use connection::Connection;
pub use cursor::ResultCursor;
pub use error::{DriverError, NoTransactionReason, Result};
pub use statement::{ExecuteOutcome, PreparedStatement, Statement};
pub use transaction::{TransactionCoordinator, TransactionHandle};
pub use transport::SessionTransport;

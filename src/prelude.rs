//! Convenient imports for common functionality.

pub use crate::config::{
    ConnectionConfig, ConnectionConfigBuilder, Operation, Timeouts, TransactionSettings,
};
pub use crate::connection::Connection;
pub use crate::conversion::{
    ColumnReader, ConversionContext, ConversionSettings, DecimalRounding, ObjectMapping, convert,
};
pub use crate::cursor::ResultCursor;
pub use crate::error::{DriverError, NoTransactionReason};
pub use crate::params::{ParameterEncoder, infer_atom_type};
pub use crate::statement::{ExecuteOutcome, PreparedStatement, Statement};
pub use crate::transaction::{
    TransactionHandle, TransactionOptions, TransactionPriority, TransactionType,
};
pub use crate::transport::{SessionTransport, TransportError};
pub use crate::types::{AtomType, ColumnMetadata, HostValue, OffsetTime, TargetKind, WireValue};

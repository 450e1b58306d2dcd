use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::conversion::{ConversionSettings, DecimalRounding, ObjectMapping};
use crate::transaction::{TransactionOptions, TransactionPriority, TransactionType};

/// Blocking points of the driver, each with its own timeout slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Begin,
    Prepare,
    Execute,
    Fetch,
    Commit,
    Rollback,
    Close,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Begin => "begin",
            Operation::Prepare => "prepare",
            Operation::Execute => "execute",
            Operation::Fetch => "fetch",
            Operation::Commit => "commit",
            Operation::Rollback => "rollback",
            Operation::Close => "close",
        }
    }
}

/// Per-operation timeouts. `None` everywhere means every call waits without bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timeouts {
    pub default: Option<Duration>,
    pub begin: Option<Duration>,
    /// Prepare, execute and fetch.
    pub execute: Option<Duration>,
    /// Commit and rollback.
    pub commit: Option<Duration>,
    /// Release of cursors, prepared statements and transactions.
    pub close: Option<Duration>,
}

impl Timeouts {
    /// Operation-specific timeout, else the connection default, else unbounded.
    #[must_use]
    pub fn resolve(&self, op: Operation) -> Option<Duration> {
        let specific = match op {
            Operation::Begin => self.begin,
            Operation::Prepare | Operation::Execute | Operation::Fetch => self.execute,
            Operation::Commit | Operation::Rollback => self.commit,
            Operation::Close => self.close,
        };
        specific.or(self.default)
    }
}

/// Client-side transaction properties used to build [`TransactionOptions`].
///
/// Every setter invalidates the cached options; the next begin rebuilds them.
#[derive(Debug, Clone, Default)]
pub struct TransactionSettings {
    transaction_type: TransactionType,
    label: Option<String>,
    include_ddl: Option<bool>,
    write_preserve: Vec<String>,
    inclusive_read_area: Vec<String>,
    exclusive_read_area: Vec<String>,
    scan_parallel: Option<u32>,
    priority: Option<TransactionPriority>,
    cached: Option<TransactionOptions>,
}

impl TransactionSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn changed(&mut self, property: &str) {
        if self.cached.take().is_some() {
            tracing::trace!(property, "transaction options invalidated");
        }
    }

    pub fn set_transaction_type(&mut self, transaction_type: TransactionType) {
        self.transaction_type = transaction_type;
        self.changed("type");
    }

    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label;
        self.changed("label");
    }

    pub fn set_include_ddl(&mut self, include_ddl: Option<bool>) {
        self.include_ddl = include_ddl;
        self.changed("include_ddl");
    }

    pub fn set_write_preserve(&mut self, tables: Vec<String>) {
        self.write_preserve = tables;
        self.changed("write_preserve");
    }

    pub fn set_inclusive_read_area(&mut self, tables: Vec<String>) {
        self.inclusive_read_area = tables;
        self.changed("inclusive_read_area");
    }

    pub fn set_exclusive_read_area(&mut self, tables: Vec<String>) {
        self.exclusive_read_area = tables;
        self.changed("exclusive_read_area");
    }

    pub fn set_scan_parallel(&mut self, scan_parallel: Option<u32>) {
        self.scan_parallel = scan_parallel;
        self.changed("scan_parallel");
    }

    pub fn set_priority(&mut self, priority: Option<TransactionPriority>) {
        self.priority = priority;
        self.changed("priority");
    }

    #[must_use]
    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Options for the next begin request, rebuilt only after a change.
    pub fn options(&mut self) -> &TransactionOptions {
        self.cached.get_or_insert_with(|| TransactionOptions {
            transaction_type: self.transaction_type,
            label: self.label.clone(),
            include_ddl: self.include_ddl,
            write_preserve: self.write_preserve.clone(),
            inclusive_read_area: self.inclusive_read_area.clone(),
            exclusive_read_area: self.exclusive_read_area.clone(),
            scan_parallel: self.scan_parallel,
            priority: self.priority,
        })
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }
}

/// Options for opening a [`Connection`](crate::Connection).
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub autocommit: bool,
    pub timeouts: Timeouts,
    pub transaction: TransactionSettings,
    pub conversion: ConversionSettings,
    /// Row cap applied to statements that do not set their own.
    pub max_rows: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            autocommit: true,
            timeouts: Timeouts::default(),
            transaction: TransactionSettings::default(),
            conversion: ConversionSettings::default(),
            max_rows: None,
        }
    }
}

impl ConnectionConfig {
    #[must_use]
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new()
    }
}

/// Fluent builder for [`ConnectionConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn autocommit(mut self, autocommit: bool) -> Self {
        self.config.autocommit = autocommit;
        self
    }

    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.default = Some(timeout);
        self
    }

    #[must_use]
    pub fn begin_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.begin = Some(timeout);
        self
    }

    #[must_use]
    pub fn execute_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.execute = Some(timeout);
        self
    }

    #[must_use]
    pub fn commit_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.commit = Some(timeout);
        self
    }

    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.close = Some(timeout);
        self
    }

    #[must_use]
    pub fn transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.config.transaction.set_transaction_type(transaction_type);
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.transaction.set_label(Some(label.into()));
        self
    }

    #[must_use]
    pub fn write_preserve(mut self, tables: Vec<String>) -> Self {
        self.config.transaction.set_write_preserve(tables);
        self
    }

    #[must_use]
    pub fn object_mapping(mut self, mapping: ObjectMapping) -> Self {
        self.config.conversion.object_mapping = mapping;
        self
    }

    #[must_use]
    pub fn decimal_rounding(mut self, rounding: DecimalRounding) -> Self {
        self.config.conversion.decimal_rounding = rounding;
        self
    }

    /// Zone applied to zone-free values when a read supplies no calendar.
    #[must_use]
    pub fn default_zone(mut self, offset: FixedOffset) -> Self {
        self.config.conversion.default_zone = Some(offset);
        self
    }

    #[must_use]
    pub fn max_rows(mut self, max_rows: usize) -> Self {
        self.config.max_rows = Some(max_rows);
        self
    }

    #[must_use]
    pub fn finish(self) -> ConnectionConfig {
        self.config
    }
}

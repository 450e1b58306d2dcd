use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Concurrency-control flavour of a remote transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionType {
    /// Optimistic short transaction (OCC).
    #[default]
    #[value(alias = "occ")]
    Short,
    /// Long transaction with declared write preserve (LTX).
    #[value(alias = "ltx")]
    Long,
    /// Read-only transaction (RTX).
    #[value(alias = "rtx")]
    ReadOnly,
}

/// How a long transaction treats transactions already running when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionPriority {
    Interrupt,
    Wait,
    InterruptExclude,
    WaitExclude,
}

/// Options sent with a begin request. Unset fields are omitted from the request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionOptions {
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_ddl: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub write_preserve: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub inclusive_read_area: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub exclusive_read_area: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_parallel: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TransactionPriority>,
}

use chrono::{DateTime, FixedOffset, NaiveDateTime};

use super::{ConversionContext, mismatch};
use crate::error::{DriverError, Result};
use crate::types::{HostValue, TargetKind, WireValue, iso_time};

pub(super) fn to_string(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let text = match value {
        WireValue::Boolean(b) => b.to_string(),
        WireValue::Int4(v) => v.to_string(),
        WireValue::Int8(v) => v.to_string(),
        WireValue::Float4(v) => float_text(f64::from(*v), v.to_string()),
        WireValue::Float8(v) => float_text(*v, v.to_string()),
        WireValue::Decimal(d) => d.to_string(),
        WireValue::Character(s) => s.clone(),
        WireValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        WireValue::TimeOfDay(t) => iso_time(t),
        WireValue::TimePoint(dt) => iso_date_time(dt),
        WireValue::TimeOfDayWithTimeZone(t) => t.to_string(),
        WireValue::TimePointWithTimeZone(dt) => iso_offset_date_time(dt),
        WireValue::Clob(lob) => utf8(ctx.read_lob(lob)?, TargetKind::String)?,
        other => return mismatch(other, TargetKind::String),
    };
    Ok(HostValue::String(text))
}

/// Shortest round-tripping decimal text, with spelled-out infinities.
fn float_text(v: f64, shortest: String) -> String {
    if v.is_infinite() {
        if v.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else {
        shortest
    }
}

pub(super) fn iso_date_time(dt: &NaiveDateTime) -> String {
    format!("{}T{}", dt.date().format("%Y-%m-%d"), iso_time(&dt.time()))
}

pub(super) fn iso_offset_date_time(dt: &DateTime<FixedOffset>) -> String {
    format!("{}{}", iso_date_time(&dt.naive_local()), dt.offset())
}

pub(super) fn utf8(bytes: Vec<u8>, target: TargetKind) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| DriverError::malformed(target, "<character large object>", e))
}

//! Date and time targets.
//!
//! Three families:
//! - `Date`/`Time`/`Timestamp` read wall-clock fields in the effective zone
//!   (calendar, else connection default, else system). Zoned wire values are
//!   moved to that zone first, keeping the instant.
//! - `LocalDate`/`LocalTime`/`LocalDateTime` drop any zone and keep the local fields.
//! - `OffsetTime`/`OffsetDateTime`/`ZonedDateTime` keep the instant of zoned wire
//!   values and attach the effective zone to zone-free ones.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use super::{ConversionContext, Zone, mismatch};
use crate::error::{DriverError, Result};
use crate::types::{HostValue, OffsetTime, TargetKind, WireValue};

fn parse_date(literal: &str, target: TargetKind) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(literal.trim(), "%Y-%m-%d")
        .map_err(|e| DriverError::malformed(target, literal, e))
}

fn parse_time(literal: &str, target: TargetKind) -> Result<NaiveTime> {
    NaiveTime::from_str(literal.trim()).map_err(|e| DriverError::malformed(target, literal, e))
}

fn parse_date_time(literal: &str, target: TargetKind) -> Result<NaiveDateTime> {
    let trimmed = literal.trim();
    NaiveDateTime::from_str(trimmed)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| DriverError::malformed(target, literal, e))
}

fn parse_offset_date_time(literal: &str, target: TargetKind) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(literal.trim())
        .map_err(|e| DriverError::malformed(target, literal, e))
}

fn parse_offset_time(literal: &str, target: TargetKind) -> Result<OffsetTime> {
    let trimmed = literal.trim();
    let (time, rest) = NaiveTime::parse_and_remainder(trimmed, "%H:%M:%S%.f")
        .map_err(|e| DriverError::malformed(target, literal, e))?;
    let offset = if rest.eq_ignore_ascii_case("z") {
        FixedOffset::east_opt(0)
    } else {
        FixedOffset::from_str(rest).ok()
    }
    .ok_or_else(|| DriverError::malformed(target, literal, "missing or invalid offset"))?;
    Ok(OffsetTime::new(time, offset))
}

/// Wall-clock date-time of `dt` in `zone`.
fn local_in(zone: Zone, dt: &DateTime<FixedOffset>) -> NaiveDateTime {
    let utc = dt.naive_utc();
    dt.with_timezone(&zone.offset_at_utc(&utc)).naive_local()
}

pub(super) fn to_date(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::Date;
    let date = match value {
        WireValue::Date(d) => *d,
        WireValue::TimePoint(dt) => dt.date(),
        WireValue::TimePointWithTimeZone(dt) => local_in(ctx.zone(), dt).date(),
        WireValue::Character(s) => parse_date(s, target)?,
        other => return mismatch(other, target),
    };
    Ok(HostValue::Date(date))
}

pub(super) fn to_time(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::Time;
    let time = match value {
        WireValue::TimeOfDay(t) => *t,
        WireValue::TimePoint(dt) => dt.time(),
        WireValue::TimeOfDayWithTimeZone(t) => {
            t.with_offset_same_instant(ctx.zone().offset_now()).time
        }
        WireValue::TimePointWithTimeZone(dt) => local_in(ctx.zone(), dt).time(),
        WireValue::Character(s) => parse_time(s, target)?,
        other => return mismatch(other, target),
    };
    Ok(HostValue::Time(time))
}

pub(super) fn to_timestamp(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::Timestamp;
    let timestamp = match value {
        WireValue::TimePoint(dt) => *dt,
        WireValue::Date(d) => d.and_time(NaiveTime::MIN),
        WireValue::TimePointWithTimeZone(dt) => local_in(ctx.zone(), dt),
        WireValue::Character(s) => parse_date_time(s, target)?,
        other => return mismatch(other, target),
    };
    Ok(HostValue::Timestamp(timestamp))
}

pub(super) fn to_local_date(value: &WireValue, _ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::LocalDate;
    let date = match value {
        WireValue::Date(d) => *d,
        WireValue::TimePoint(dt) => dt.date(),
        WireValue::TimePointWithTimeZone(dt) => dt.naive_local().date(),
        WireValue::Character(s) => parse_date(s, target)?,
        other => return mismatch(other, target),
    };
    Ok(HostValue::LocalDate(date))
}

pub(super) fn to_local_time(value: &WireValue, _ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::LocalTime;
    let time = match value {
        WireValue::TimeOfDay(t) => *t,
        WireValue::TimePoint(dt) => dt.time(),
        WireValue::TimeOfDayWithTimeZone(t) => t.time,
        WireValue::TimePointWithTimeZone(dt) => dt.naive_local().time(),
        WireValue::Character(s) => parse_time(s, target)?,
        other => return mismatch(other, target),
    };
    Ok(HostValue::LocalTime(time))
}

pub(super) fn to_local_date_time(value: &WireValue, _ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::LocalDateTime;
    let date_time = match value {
        WireValue::TimePoint(dt) => *dt,
        WireValue::TimePointWithTimeZone(dt) => dt.naive_local(),
        WireValue::Character(s) => parse_date_time(s, target)?,
        other => return mismatch(other, target),
    };
    Ok(HostValue::LocalDateTime(date_time))
}

pub(super) fn to_offset_time(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::OffsetTime;
    let offset = ctx.zone().offset_now();
    let time = match value {
        WireValue::TimeOfDayWithTimeZone(t) => t.with_offset_same_instant(offset),
        WireValue::TimeOfDay(t) => OffsetTime::new(*t, offset),
        WireValue::Character(s) => parse_offset_time(s, target)?,
        other => return mismatch(other, target),
    };
    Ok(HostValue::OffsetTime(time))
}

/// Shared by the offset and zoned date-time targets; with fixed-offset zones the
/// two differ only in the host variant they produce.
fn instant_in_zone(
    value: &WireValue,
    ctx: &ConversionContext,
    target: TargetKind,
) -> Result<Option<DateTime<FixedOffset>>> {
    let zone = ctx.zone();
    let attach = |local: NaiveDateTime| {
        zone.from_local(&local).ok_or_else(|| {
            DriverError::out_of_range(target, format!("{local} does not exist in the target zone"))
        })
    };
    let dt = match value {
        WireValue::TimePointWithTimeZone(dt) => {
            let offset = zone.offset_at_utc(&dt.naive_utc());
            dt.with_timezone(&offset)
        }
        WireValue::TimePoint(local) => attach(*local)?,
        WireValue::Date(d) => attach(d.and_time(NaiveTime::MIN))?,
        WireValue::Character(s) => parse_offset_date_time(s, target)?,
        _ => return Ok(None),
    };
    Ok(Some(dt))
}

pub(super) fn to_offset_date_time(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::OffsetDateTime;
    match instant_in_zone(value, ctx, target)? {
        Some(dt) => Ok(HostValue::OffsetDateTime(dt)),
        None => mismatch(value, target),
    }
}

pub(super) fn to_zoned_date_time(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::ZonedDateTime;
    match instant_in_zone(value, ctx, target)? {
        Some(dt) => Ok(HostValue::ZonedDateTime(dt)),
        None => mismatch(value, target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_literals() {
        let ctx = ConversionContext::default();
        assert_eq!(
            to_local_date_time(&WireValue::Character("2024-03-04T05:06:07".into()), &ctx).unwrap(),
            HostValue::LocalDateTime(
                NaiveDate::from_ymd_opt(2024, 3, 4)
                    .unwrap()
                    .and_hms_opt(5, 6, 7)
                    .unwrap()
            )
        );
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            to_offset_time(
                &WireValue::Character("10:00:00Z".into()),
                &ctx.clone().with_calendar(utc)
            )
            .unwrap(),
            HostValue::OffsetTime(OffsetTime::new(
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                utc
            ))
        );
        let err = to_date(&WireValue::Character("yesterday".into()), &ctx).unwrap_err();
        assert!(matches!(err, DriverError::MalformedLiteralConversion { .. }));
    }

    #[test]
    fn date_widens_to_midnight_timestamp() {
        let d = NaiveDate::from_ymd_opt(2020, 5, 17).unwrap();
        assert_eq!(
            to_timestamp(&WireValue::Date(d), &ConversionContext::default()).unwrap(),
            HostValue::Timestamp(d.and_hms_opt(0, 0, 0).unwrap())
        );
    }
}

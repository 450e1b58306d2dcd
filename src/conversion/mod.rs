//! Wire value to host value conversion.
//!
//! [`convert`] is the one-shot entry point. Callers that read many cells for the
//! same target resolve a [`ColumnReader`] once and reuse it, so the
//! target dispatch happens when the target is known rather than per cell.

mod lob;
mod numeric;
mod temporal;
mod text;

use std::fmt;
use std::sync::Weak;

use chrono::{FixedOffset, Local, NaiveDateTime, Offset, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};
use crate::params::natural_target_for;
use crate::types::{AtomType, HostValue, LobReference, TargetKind, WireValue};

pub use lob::LobReader;

/// A resolved conversion routine for one target kind.
pub type Converter = fn(&WireValue, &ConversionContext) -> Result<HostValue>;

/// What the generic `Object` target produces for each wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectMapping {
    /// Each wire type maps to its closest host type; temporal values stay zone-free
    /// (`LocalDate`, `LocalTime`, `LocalDateTime`) or keep their offset.
    #[default]
    Natural,
    /// Temporal values map to the zone-applied `Date`/`Time`/`Timestamp` kinds.
    SqlTemporal,
    /// Use the first entry of the parameter inference table declaring the wire type.
    FirstCompatible,
}

impl ObjectMapping {
    #[must_use]
    pub fn target_for(self, atom: AtomType) -> TargetKind {
        match self {
            ObjectMapping::Natural => natural_kind(atom),
            ObjectMapping::SqlTemporal => match atom {
                AtomType::Date => TargetKind::Date,
                AtomType::TimeOfDay | AtomType::TimeOfDayWithTimeZone => TargetKind::Time,
                AtomType::TimePoint | AtomType::TimePointWithTimeZone => TargetKind::Timestamp,
                other => natural_kind(other),
            },
            ObjectMapping::FirstCompatible => {
                natural_target_for(atom).unwrap_or_else(|| natural_kind(atom))
            }
        }
    }
}

pub(crate) fn natural_kind(atom: AtomType) -> TargetKind {
    match atom {
        AtomType::Boolean => TargetKind::Boolean,
        AtomType::Int4 => TargetKind::Int,
        AtomType::Int8 => TargetKind::Long,
        AtomType::Float4 => TargetKind::Float,
        AtomType::Float8 => TargetKind::Double,
        AtomType::Decimal => TargetKind::Decimal,
        AtomType::Character => TargetKind::String,
        AtomType::Octet => TargetKind::Bytes,
        AtomType::Date => TargetKind::LocalDate,
        AtomType::TimeOfDay => TargetKind::LocalTime,
        AtomType::TimePoint => TargetKind::LocalDateTime,
        AtomType::TimeOfDayWithTimeZone => TargetKind::OffsetTime,
        AtomType::TimePointWithTimeZone => TargetKind::OffsetDateTime,
        AtomType::Blob => TargetKind::Blob,
        AtomType::Clob => TargetKind::Clob,
    }
}

/// Policy for reading a decimal at a smaller scale than it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecimalRounding {
    /// Fail with `OutOfRangeConversion` if non-zero fractional digits would be dropped.
    #[default]
    Reject,
    /// Round half away from zero.
    HalfUp,
}

/// Connection-level conversion defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversionSettings {
    pub object_mapping: ObjectMapping,
    pub decimal_rounding: DecimalRounding,
    /// Zone used when the caller supplies none; `None` means the system zone.
    pub default_zone: Option<FixedOffset>,
}

/// Zone applied to temporal conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Zone {
    Fixed(FixedOffset),
    System,
}

impl Zone {
    pub(crate) fn offset_at_utc(self, utc: &NaiveDateTime) -> FixedOffset {
        match self {
            Zone::Fixed(offset) => offset,
            Zone::System => Local.offset_from_utc_datetime(utc).fix(),
        }
    }

    pub(crate) fn offset_now(self) -> FixedOffset {
        match self {
            Zone::Fixed(offset) => offset,
            Zone::System => Local::now().offset().fix(),
        }
    }

    /// Attach this zone to a local date-time. Gaps (skipped local times) yield `None`;
    /// overlaps resolve to the earlier instant.
    pub(crate) fn from_local(
        self,
        local: &NaiveDateTime,
    ) -> Option<chrono::DateTime<FixedOffset>> {
        match self {
            Zone::Fixed(offset) => offset.from_local_datetime(local).single(),
            Zone::System => Local
                .from_local_datetime(local)
                .earliest()
                .map(|dt| dt.fixed_offset()),
        }
    }
}

/// Per-call inputs to a conversion: zone, scale, and the large-object channel.
#[derive(Clone, Default)]
pub struct ConversionContext {
    settings: ConversionSettings,
    calendar: Option<FixedOffset>,
    scale: Option<u32>,
    lob_reader: Option<Weak<dyn LobReader>>,
}

impl ConversionContext {
    #[must_use]
    pub fn new(settings: ConversionSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Interpret zone-free values in `offset` instead of the default zone.
    #[must_use]
    pub fn with_calendar(mut self, offset: FixedOffset) -> Self {
        self.calendar = Some(offset);
        self
    }

    /// Requested scale for `Decimal` targets.
    #[must_use]
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Lookup-only handle used to open large objects; the owner keeps the strong reference.
    #[must_use]
    pub fn with_lob_reader(mut self, reader: Weak<dyn LobReader>) -> Self {
        self.lob_reader = Some(reader);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &ConversionSettings {
        &self.settings
    }

    pub(crate) fn zone(&self) -> Zone {
        match self.calendar.or(self.settings.default_zone) {
            Some(offset) => Zone::Fixed(offset),
            None => Zone::System,
        }
    }

    pub(crate) fn scale(&self) -> Option<u32> {
        self.scale
    }

    pub(crate) fn read_lob(&self, lob: &LobReference) -> Result<Vec<u8>> {
        let reader = self
            .lob_reader
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| DriverError::Closed("large object channel is not available".into()))?;
        reader.read_lob(lob)
    }
}

impl fmt::Debug for ConversionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionContext")
            .field("settings", &self.settings)
            .field("calendar", &self.calendar)
            .field("scale", &self.scale)
            .field("lob_reader", &self.lob_reader.is_some())
            .finish()
    }
}

/// Conversion routine bound to a target kind.
#[derive(Clone, Copy)]
pub struct ColumnReader {
    target: TargetKind,
    convert: Converter,
}

impl ColumnReader {
    #[must_use]
    pub fn new(target: TargetKind) -> Self {
        Self {
            target,
            convert: converter_for(target),
        }
    }

    #[must_use]
    pub fn target(&self) -> TargetKind {
        self.target
    }

    /// Convert one value. Null reads as `HostValue::Null` for object targets and as
    /// zero/false for primitive targets.
    ///
    /// # Errors
    /// Returns one of the classified conversion errors, or `Closed` when a large
    /// object can no longer be read.
    pub fn read(&self, value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
        if value.is_null() {
            return Ok(null_value(self.target));
        }
        (self.convert)(value, ctx)
    }
}

impl fmt::Debug for ColumnReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnReader")
            .field("target", &self.target)
            .finish()
    }
}

/// Convert `value` to `target` in one call.
///
/// # Errors
/// See [`ColumnReader::read`].
pub fn convert(value: &WireValue, target: TargetKind, ctx: &ConversionContext) -> Result<HostValue> {
    ColumnReader::new(target).read(value, ctx)
}

#[must_use]
pub fn converter_for(target: TargetKind) -> Converter {
    match target {
        TargetKind::String => text::to_string,
        TargetKind::Boolean => numeric::to_boolean,
        TargetKind::Byte => numeric::to_byte,
        TargetKind::Short => numeric::to_short,
        TargetKind::Int => numeric::to_int,
        TargetKind::Long => numeric::to_long,
        TargetKind::Float => numeric::to_float,
        TargetKind::Double => numeric::to_double,
        TargetKind::Decimal => numeric::to_decimal,
        TargetKind::Bytes => lob::to_bytes,
        TargetKind::Date => temporal::to_date,
        TargetKind::Time => temporal::to_time,
        TargetKind::Timestamp => temporal::to_timestamp,
        TargetKind::LocalDate => temporal::to_local_date,
        TargetKind::LocalTime => temporal::to_local_time,
        TargetKind::LocalDateTime => temporal::to_local_date_time,
        TargetKind::OffsetTime => temporal::to_offset_time,
        TargetKind::OffsetDateTime => temporal::to_offset_date_time,
        TargetKind::ZonedDateTime => temporal::to_zoned_date_time,
        TargetKind::AsciiStream => lob::to_ascii_stream,
        TargetKind::BinaryStream => lob::to_binary_stream,
        TargetKind::CharacterStream => lob::to_character_stream,
        TargetKind::Blob => lob::to_blob,
        TargetKind::Clob => lob::to_clob,
        TargetKind::Object => to_object,
    }
}

fn to_object(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let Some(atom) = value.atom_type() else {
        return Ok(HostValue::Null);
    };
    let target = ctx.settings.object_mapping.target_for(atom);
    debug_assert!(target != TargetKind::Object);
    converter_for(target)(value, ctx)
}

pub(crate) fn null_value(target: TargetKind) -> HostValue {
    if !target.is_primitive() {
        return HostValue::Null;
    }
    match target {
        TargetKind::Boolean => HostValue::Boolean(false),
        TargetKind::Byte => HostValue::Byte(0),
        TargetKind::Short => HostValue::Short(0),
        TargetKind::Int => HostValue::Int(0),
        TargetKind::Long => HostValue::Long(0),
        TargetKind::Float => HostValue::Float(0.0),
        TargetKind::Double => HostValue::Double(0.0),
        _ => HostValue::Null,
    }
}

/// Fallback arm shared by every target routine.
pub(crate) fn mismatch(value: &WireValue, target: TargetKind) -> Result<HostValue> {
    match value.atom_type() {
        Some(from) => Err(DriverError::unsupported(from, target)),
        None => Ok(null_value(target)),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;

    use super::*;
    use crate::types::OffsetTime;

    fn utc_ctx() -> ConversionContext {
        ConversionContext::new(ConversionSettings {
            default_zone: Some(FixedOffset::east_opt(0).expect("utc")),
            ..ConversionSettings::default()
        })
    }

    fn hours(h: i32) -> FixedOffset {
        FixedOffset::east_opt(h * 3600).expect("offset")
    }

    #[test]
    fn null_reads_as_zero_for_primitives_and_null_for_objects() {
        let ctx = utc_ctx();
        assert_eq!(
            convert(&WireValue::Null, TargetKind::Int, &ctx).unwrap(),
            HostValue::Int(0)
        );
        assert_eq!(
            convert(&WireValue::Null, TargetKind::Boolean, &ctx).unwrap(),
            HostValue::Boolean(false)
        );
        assert_eq!(
            convert(&WireValue::Null, TargetKind::String, &ctx).unwrap(),
            HostValue::Null
        );
        assert_eq!(
            convert(&WireValue::Null, TargetKind::Object, &ctx).unwrap(),
            HostValue::Null
        );
    }

    #[test]
    fn narrowing_does_not_range_check() {
        let ctx = utc_ctx();
        assert_eq!(
            convert(&WireValue::Int8(300), TargetKind::Byte, &ctx).unwrap(),
            HostValue::Byte(44)
        );
        assert_eq!(
            convert(&WireValue::Int4(70_000), TargetKind::Short, &ctx).unwrap(),
            HostValue::Short(4464)
        );
        assert_eq!(
            convert(&WireValue::Float8(12.9), TargetKind::Int, &ctx).unwrap(),
            HostValue::Int(12)
        );
    }

    #[test]
    fn float_narrowing_saturates_at_int_range() {
        let ctx = utc_ctx();
        let big = WireValue::Float8(3e9);
        assert_eq!(
            convert(&big, TargetKind::Int, &ctx).unwrap(),
            HostValue::Int(i32::MAX)
        );
        assert_eq!(
            convert(&big, TargetKind::Short, &ctx).unwrap(),
            HostValue::Short(-1)
        );
        assert_eq!(
            convert(&big, TargetKind::Byte, &ctx).unwrap(),
            HostValue::Byte(-1)
        );
        assert_eq!(
            convert(&big, TargetKind::Long, &ctx).unwrap(),
            HostValue::Long(3_000_000_000)
        );
        assert_eq!(
            convert(&WireValue::Float4(-1e10), TargetKind::Int, &ctx).unwrap(),
            HostValue::Int(i32::MIN)
        );
        assert_eq!(
            convert(&WireValue::Float8(f64::NAN), TargetKind::Short, &ctx).unwrap(),
            HostValue::Short(0)
        );
    }

    #[test]
    fn character_to_integer_classifies_failures() {
        let ctx = utc_ctx();
        let err = convert(&WireValue::Character("abc".into()), TargetKind::Int, &ctx).unwrap_err();
        assert!(matches!(
            err,
            DriverError::MalformedLiteralConversion {
                target: TargetKind::Int,
                ..
            }
        ));

        let err = convert(&WireValue::Character("300".into()), TargetKind::Byte, &ctx).unwrap_err();
        assert!(matches!(err, DriverError::OutOfRangeConversion { .. }));

        assert_eq!(
            convert(&WireValue::Character(" 42 ".into()), TargetKind::Long, &ctx).unwrap(),
            HostValue::Long(42)
        );
    }

    #[test]
    fn numeric_to_boolean_only_accepts_zero_and_one() {
        let ctx = utc_ctx();
        assert_eq!(
            convert(&WireValue::Int4(1), TargetKind::Boolean, &ctx).unwrap(),
            HostValue::Boolean(true)
        );
        assert_eq!(
            convert(&WireValue::Float8(0.0), TargetKind::Boolean, &ctx).unwrap(),
            HostValue::Boolean(false)
        );
        let err = convert(&WireValue::Int8(2), TargetKind::Boolean, &ctx).unwrap_err();
        assert!(matches!(
            err,
            DriverError::UnsupportedConversion {
                from: AtomType::Int8,
                target: TargetKind::Boolean
            }
        ));
    }

    #[test]
    fn decimal_from_float_keeps_binary_expansion() {
        let ctx = utc_ctx();
        let value = convert(&WireValue::Float8(0.5), TargetKind::Decimal, &ctx).unwrap();
        assert_eq!(value, HostValue::Decimal(Decimal::from_str("0.5").unwrap()));

        let value = convert(&WireValue::Float8(0.1), TargetKind::Decimal, &ctx).unwrap();
        let HostValue::Decimal(d) = value else {
            panic!("expected decimal");
        };
        assert_ne!(d.to_string(), "0.1");

        let err = convert(&WireValue::Float8(f64::NAN), TargetKind::Decimal, &ctx).unwrap_err();
        assert!(matches!(err, DriverError::OutOfRangeConversion { .. }));
        let err =
            convert(&WireValue::Float4(f32::INFINITY), TargetKind::Decimal, &ctx).unwrap_err();
        assert!(matches!(err, DriverError::OutOfRangeConversion { .. }));
    }

    #[test]
    fn decimal_scale_policy() {
        let value = WireValue::Decimal(Decimal::from_str("123.4").unwrap());

        let same = convert(&value, TargetKind::Decimal, &utc_ctx().with_scale(1)).unwrap();
        assert_eq!(same, HostValue::Decimal(Decimal::from_str("123.4").unwrap()));
        assert_eq!(same.as_decimal().unwrap().scale(), 1);

        let wider = convert(&value, TargetKind::Decimal, &utc_ctx().with_scale(3)).unwrap();
        assert_eq!(wider.as_decimal().unwrap().to_string(), "123.400");

        let err = convert(&value, TargetKind::Decimal, &utc_ctx().with_scale(0)).unwrap_err();
        assert!(matches!(err, DriverError::OutOfRangeConversion { .. }));

        let rounding = ConversionContext::new(ConversionSettings {
            decimal_rounding: DecimalRounding::HalfUp,
            ..ConversionSettings::default()
        })
        .with_scale(0);
        assert_eq!(
            convert(&value, TargetKind::Decimal, &rounding).unwrap(),
            HostValue::Decimal(Decimal::from(123))
        );

        let zeros = WireValue::Decimal(Decimal::from_str("5.00").unwrap());
        let narrowed = convert(&zeros, TargetKind::Decimal, &utc_ctx().with_scale(0)).unwrap();
        assert_eq!(narrowed.as_decimal().unwrap().to_string(), "5");
    }

    #[test]
    fn string_forms_are_canonical() {
        let ctx = utc_ctx();
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let time = NaiveTime::from_hms_milli_opt(8, 5, 3, 250).unwrap();
        let cases = [
            (WireValue::Boolean(true), "true"),
            (WireValue::Int4(-7), "-7"),
            (WireValue::Float8(1.5), "1.5"),
            (WireValue::Decimal(Decimal::from_str("10.50").unwrap()), "10.50"),
            (WireValue::Date(date), "2024-02-29"),
            (WireValue::TimeOfDay(time), "08:05:03.250"),
            (
                WireValue::TimePoint(date.and_hms_opt(23, 0, 0).unwrap()),
                "2024-02-29T23:00:00",
            ),
            (
                WireValue::TimeOfDayWithTimeZone(OffsetTime::new(
                    NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                    hours(9),
                )),
                "09:00:00+09:00",
            ),
        ];
        for (wire, expected) in cases {
            assert_eq!(
                convert(&wire, TargetKind::String, &ctx).unwrap(),
                HostValue::String(expected.to_string()),
                "{wire:?}"
            );
        }
    }

    #[test]
    fn zoned_time_point_preserves_instant() {
        let tokyo = hours(9);
        let wire = WireValue::TimePointWithTimeZone(
            tokyo
                .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
                .single()
                .unwrap(),
        );
        let ctx = utc_ctx().with_calendar(hours(-5));

        let HostValue::OffsetDateTime(dt) =
            convert(&wire, TargetKind::OffsetDateTime, &ctx).unwrap()
        else {
            panic!("expected offset date time");
        };
        assert_eq!(dt.offset(), &hours(-5));
        assert_eq!(dt.naive_local().to_string(), "2023-12-31 19:00:00");

        assert_eq!(
            convert(&wire, TargetKind::Timestamp, &ctx).unwrap(),
            HostValue::Timestamp(
                NaiveDate::from_ymd_opt(2023, 12, 31)
                    .unwrap()
                    .and_hms_opt(19, 0, 0)
                    .unwrap()
            )
        );
        // Zone-free targets keep the wire's local fields.
        assert_eq!(
            convert(&wire, TargetKind::LocalDateTime, &ctx).unwrap(),
            HostValue::LocalDateTime(
                NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(9, 0, 0)
                    .unwrap()
            )
        );
    }

    #[test]
    fn zoned_time_of_day_shifts_offset() {
        let wire = WireValue::TimeOfDayWithTimeZone(OffsetTime::new(
            NaiveTime::from_hms_opt(1, 30, 0).unwrap(),
            hours(9),
        ));
        let ctx = utc_ctx();
        assert_eq!(
            convert(&wire, TargetKind::OffsetTime, &ctx).unwrap(),
            HostValue::OffsetTime(OffsetTime::new(
                NaiveTime::from_hms_opt(16, 30, 0).unwrap(),
                hours(0)
            ))
        );
        assert_eq!(
            convert(&wire, TargetKind::LocalTime, &ctx).unwrap(),
            HostValue::LocalTime(NaiveTime::from_hms_opt(1, 30, 0).unwrap())
        );
    }

    #[test]
    fn unzoned_value_takes_calendar_zone() {
        let local = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let ctx = utc_ctx().with_calendar(hours(2));
        let HostValue::ZonedDateTime(dt) =
            convert(&WireValue::TimePoint(local), TargetKind::ZonedDateTime, &ctx).unwrap()
        else {
            panic!("expected zoned date time");
        };
        assert_eq!(dt.naive_local(), local);
        assert_eq!(dt.offset(), &hours(2));
    }

    #[test]
    fn unsupported_pairs_carry_the_target() {
        let ctx = utc_ctx();
        let err = convert(&WireValue::Octet(vec![1]), TargetKind::Date, &ctx).unwrap_err();
        assert!(matches!(
            err,
            DriverError::UnsupportedConversion {
                from: AtomType::Octet,
                target: TargetKind::Date
            }
        ));
        let err = convert(
            &WireValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            TargetKind::Int,
            &ctx,
        )
        .unwrap_err();
        assert!(err.is_conversion_error());
    }

    #[test]
    fn object_mapping_is_configurable() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let wire = WireValue::Date(date);
        assert_eq!(
            convert(&wire, TargetKind::Object, &utc_ctx()).unwrap(),
            HostValue::LocalDate(date)
        );
        let sql = ConversionContext::new(ConversionSettings {
            object_mapping: ObjectMapping::SqlTemporal,
            ..ConversionSettings::default()
        });
        assert_eq!(
            convert(&wire, TargetKind::Object, &sql).unwrap(),
            HostValue::Date(date)
        );
        assert_eq!(
            convert(&WireValue::Int4(5), TargetKind::Object, &sql).unwrap(),
            HostValue::Int(5)
        );
    }

    #[test]
    fn lob_without_reader_is_closed() {
        let err = convert(
            &WireValue::Blob(LobReference::new(1)),
            TargetKind::Bytes,
            &utc_ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, DriverError::Closed(_)));
    }
}

use std::num::IntErrorKind;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::{ConversionContext, DecimalRounding, mismatch};
use crate::error::{DriverError, Result};
use crate::types::{HostValue, TargetKind, WireValue};

#[allow(clippy::cast_precision_loss)]
pub(super) fn to_boolean(value: &WireValue, _ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::Boolean;
    let as_double = match value {
        WireValue::Boolean(b) => return Ok(HostValue::Boolean(*b)),
        WireValue::Int4(v) => f64::from(*v),
        WireValue::Int8(v) => *v as f64,
        WireValue::Float4(v) => f64::from(*v),
        WireValue::Float8(v) => *v,
        WireValue::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
        WireValue::Character(s) => return parse_boolean(s).map(HostValue::Boolean),
        other => return mismatch(other, target),
    };
    if as_double == 1.0 {
        Ok(HostValue::Boolean(true))
    } else if as_double == 0.0 {
        Ok(HostValue::Boolean(false))
    } else {
        // Only 0 and 1 have a boolean reading; the atom type is known here.
        mismatch(value, target)
    }
}

fn parse_boolean(literal: &str) -> Result<bool> {
    match literal.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(DriverError::malformed(
            TargetKind::Boolean,
            literal,
            "expected true or false",
        )),
    }
}

fn parse_integer<T>(literal: &str, target: TargetKind) -> Result<T>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    literal.trim().parse::<T>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
            DriverError::out_of_range(target, format!("{literal:?} does not fit"))
        }
        _ => DriverError::malformed(target, literal, e),
    })
}

/// Integer part of a decimal, truncated toward zero.
fn decimal_integral(d: &Decimal) -> i128 {
    d.trunc().to_i128().unwrap_or_default()
}

// Narrowing between numeric widths is a plain `as` cast: no range check.
// Floats saturate at `$via` first, so `byte` and `short` narrow through `int`.
macro_rules! integer_target {
    ($name:ident, $ty:ty, $via:ty, $variant:ident) => {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        pub(super) fn $name(value: &WireValue, _ctx: &ConversionContext) -> Result<HostValue> {
            let target = TargetKind::$variant;
            let narrowed: $ty = match value {
                WireValue::Boolean(b) => <$ty>::from(*b),
                WireValue::Int4(v) => *v as $ty,
                WireValue::Int8(v) => *v as $ty,
                WireValue::Float4(v) => (*v as $via) as $ty,
                WireValue::Float8(v) => (*v as $via) as $ty,
                WireValue::Decimal(d) => decimal_integral(d) as $ty,
                WireValue::Character(s) => parse_integer::<$ty>(s, target)?,
                other => return mismatch(other, target),
            };
            Ok(HostValue::$variant(narrowed))
        }
    };
}

integer_target!(to_byte, i8, i32, Byte);
integer_target!(to_short, i16, i32, Short);
integer_target!(to_int, i32, i32, Int);
integer_target!(to_long, i64, i64, Long);

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub(super) fn to_float(value: &WireValue, _ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::Float;
    let v = match value {
        WireValue::Boolean(b) => f32::from(u8::from(*b)),
        WireValue::Int4(v) => *v as f32,
        WireValue::Int8(v) => *v as f32,
        WireValue::Float4(v) => *v,
        WireValue::Float8(v) => *v as f32,
        WireValue::Decimal(d) => d
            .to_f32()
            .ok_or_else(|| DriverError::out_of_range(target, d.to_string()))?,
        WireValue::Character(s) => s
            .trim()
            .parse::<f32>()
            .map_err(|e| DriverError::malformed(target, s.as_str(), e))?,
        other => return mismatch(other, target),
    };
    Ok(HostValue::Float(v))
}

#[allow(clippy::cast_precision_loss)]
pub(super) fn to_double(value: &WireValue, _ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::Double;
    let v = match value {
        WireValue::Boolean(b) => f64::from(u8::from(*b)),
        WireValue::Int4(v) => f64::from(*v),
        WireValue::Int8(v) => *v as f64,
        WireValue::Float4(v) => f64::from(*v),
        WireValue::Float8(v) => *v,
        WireValue::Decimal(d) => d
            .to_f64()
            .ok_or_else(|| DriverError::out_of_range(target, d.to_string()))?,
        WireValue::Character(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| DriverError::malformed(target, s.as_str(), e))?,
        other => return mismatch(other, target),
    };
    Ok(HostValue::Double(v))
}

pub(super) fn to_decimal(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::Decimal;
    let decimal = match value {
        WireValue::Int4(v) => Decimal::from(*v),
        WireValue::Int8(v) => Decimal::from(*v),
        // Exact binary expansion of the float, not its shortest printed form.
        WireValue::Float4(v) => Decimal::from_f32_retain(*v)
            .ok_or_else(|| DriverError::out_of_range(target, format!("{v} has no decimal form")))?,
        WireValue::Float8(v) => Decimal::from_f64_retain(*v)
            .ok_or_else(|| DriverError::out_of_range(target, format!("{v} has no decimal form")))?,
        WireValue::Decimal(d) => *d,
        WireValue::Character(s) => parse_decimal(s)?,
        other => return mismatch(other, target),
    };
    let decimal = match ctx.scale() {
        Some(scale) => apply_scale(decimal, scale, ctx.settings().decimal_rounding)?,
        None => decimal,
    };
    Ok(HostValue::Decimal(decimal))
}

fn parse_decimal(literal: &str) -> Result<Decimal> {
    let trimmed = literal.trim();
    Decimal::from_str_exact(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|e| DriverError::malformed(TargetKind::Decimal, literal, e))
}

/// Bring `value` to exactly `scale` fractional digits under `rounding`.
pub(crate) fn apply_scale(value: Decimal, scale: u32, rounding: DecimalRounding) -> Result<Decimal> {
    let target = TargetKind::Decimal;
    let mut scaled = if scale < value.scale() {
        match rounding {
            DecimalRounding::Reject => {
                let truncated = value.round_dp_with_strategy(scale, RoundingStrategy::ToZero);
                if truncated != value {
                    return Err(DriverError::out_of_range(
                        target,
                        format!("{value} cannot be represented with scale {scale} without rounding"),
                    ));
                }
                truncated
            }
            DecimalRounding::HalfUp => {
                value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
            }
        }
    } else {
        value
    };
    scaled.rescale(scale);
    if scaled.scale() != scale {
        return Err(DriverError::out_of_range(
            target,
            format!("{value} cannot be represented with scale {scale}"),
        ));
    }
    Ok(scaled)
}
